use crate::base::{NamedChannelSender, SenderToNormalThread};
use crate::domain::{
    ActivationCondition, ActivationType, DiagnosticEvent, ExpressionCondition,
    ExpressionTransformation, FeedbackSendBehavior, MappingId, ModifierCondition, OutputVariable,
    ProcessorMapping, ProcessorMappingOptions, TargetRef, DEFAULT_ECHO_FEEDBACK_DELAY,
};
use conductor_engine::{Interval, Mode, Source, UnitValue};
use helgoboss_midi::{Channel, ControllerNumber, KeyNumber, U14};
use serde::{Deserialize, Serialize};
use serde_repr::{Deserialize_repr, Serialize_repr};
use thiserror::Error;
use tracing::warn;

#[derive(Clone, Eq, PartialEq, Debug, Error)]
pub enum ConfigError {
    #[error("invalid source: {0}")]
    InvalidSource(&'static str),
    #[error("invalid mode: {0}")]
    InvalidMode(&'static str),
    #[error("couldn't compile {0}: {1}")]
    InvalidExpression(&'static str, String),
}

/// Serializable description of one mapping, as delivered by the external
/// configuration surface. Conversion into a [`ProcessorMapping`] validates
/// all invariants; a bad mapping is rejected as a whole.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct MappingData {
    #[serde(default)]
    pub name: String,
    pub source: SourceData,
    #[serde(default)]
    pub mode: ModeData,
    pub target: TargetData,
    #[serde(default)]
    pub activation: ActivationData,
    #[serde(default = "bool_true", rename = "controlEnabled")]
    pub control_is_enabled: bool,
    #[serde(default = "bool_true", rename = "feedbackEnabled")]
    pub feedback_is_enabled: bool,
    #[serde(default, rename = "feedbackSendBehavior")]
    pub feedback_send_behavior: usize,
}

fn bool_true() -> bool {
    true
}

impl MappingData {
    pub fn create_processor_mapping(&self) -> Result<ProcessorMapping, ConfigError> {
        let source = self.source.create_source()?;
        let mode = self.mode.create_mode()?;
        let target = self.target.create_target_ref();
        let activation_condition = self.activation.create_activation_condition()?;
        let options = ProcessorMappingOptions {
            control_is_enabled: self.control_is_enabled,
            feedback_is_enabled: self.feedback_is_enabled,
            feedback_send_behavior: FeedbackSendBehavior::try_from(self.feedback_send_behavior)
                .map_err(|_| ConfigError::InvalidMode("unknown feedback send behavior"))?,
            echo_feedback_delay: DEFAULT_ECHO_FEEDBACK_DELAY,
        };
        Ok(ProcessorMapping::new(
            MappingId::random(),
            source,
            mode,
            target,
            activation_condition,
            options,
        ))
    }
}

/// Converts a complete configuration into processor mappings.
///
/// Invalid entries are rejected individually with a diagnostic; the rest of
/// the set loads.
pub fn create_processor_mappings(
    data: &[MappingData],
    diagnostics: &SenderToNormalThread<DiagnosticEvent>,
) -> Vec<ProcessorMapping> {
    data.iter()
        .filter_map(|d| match d.create_processor_mapping() {
            Ok(m) => Some(m),
            Err(e) => {
                warn!(mapping = %d.name, "rejecting mapping: {e}");
                diagnostics.send_if_space(DiagnosticEvent::MappingRejected {
                    name: d.name.clone(),
                    reason: e.to_string(),
                });
                None
            }
        })
        .collect()
}

#[derive(Copy, Clone, Eq, PartialEq, Debug, Serialize_repr, Deserialize_repr)]
#[repr(u8)]
pub enum SourceType {
    ControlChangeValue = 0,
    NoteVelocity = 1,
    NoteKeyNumber = 2,
    PitchBendChangeValue = 3,
    ChannelPressureAmount = 4,
    ProgramChangeNumber = 5,
    ParameterNumberValue = 6,
    PolyphonicKeyPressureAmount = 7,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SourceData {
    pub r#type: SourceType,
    /// `None` matches any channel.
    #[serde(default)]
    pub channel: Option<u8>,
    /// Key, controller or parameter number, depending on the type. `None`
    /// matches any number.
    #[serde(default)]
    pub number: Option<u16>,
    #[serde(default, rename = "is14Bit")]
    pub is_14_bit: Option<bool>,
    #[serde(default, rename = "isRegistered")]
    pub is_registered: Option<bool>,
}

impl SourceData {
    pub fn create_source(&self) -> Result<Source, ConfigError> {
        let channel = match self.channel {
            None => None,
            Some(ch) if ch < 16 => Some(Channel::new(ch)),
            Some(_) => return Err(ConfigError::InvalidSource("channel out of range")),
        };
        let seven_bit_number = || -> Result<Option<u8>, ConfigError> {
            match self.number {
                None => Ok(None),
                Some(n) if n < 128 => Ok(Some(n as u8)),
                Some(_) => Err(ConfigError::InvalidSource("number out of range")),
            }
        };
        use SourceType::*;
        let source = match self.r#type {
            ControlChangeValue => {
                if self.is_14_bit == Some(true) {
                    let msb_controller_number = match seven_bit_number()? {
                        None => None,
                        // Only controllers 0-31 have a 14-bit counterpart.
                        Some(n) if n < 32 => Some(ControllerNumber::new(n)),
                        Some(_) => {
                            return Err(ConfigError::InvalidSource(
                                "not a 14-bit-capable controller number",
                            ))
                        }
                    };
                    Source::ControlChange14BitValue {
                        channel,
                        msb_controller_number,
                    }
                } else {
                    Source::ControlChangeValue {
                        channel,
                        controller_number: seven_bit_number()?.map(ControllerNumber::new),
                    }
                }
            }
            NoteVelocity => Source::NoteVelocity {
                channel,
                key_number: seven_bit_number()?.map(KeyNumber::new),
            },
            NoteKeyNumber => Source::NoteKeyNumber { channel },
            PitchBendChangeValue => Source::PitchBendChangeValue { channel },
            ChannelPressureAmount => Source::ChannelPressureAmount { channel },
            ProgramChangeNumber => Source::ProgramChangeNumber { channel },
            ParameterNumberValue => {
                let number = match self.number {
                    None => None,
                    Some(n) if n < 16384 => Some(U14::new(n)),
                    Some(_) => {
                        return Err(ConfigError::InvalidSource("parameter number out of range"))
                    }
                };
                Source::ParameterNumberValue {
                    channel,
                    number,
                    is_14_bit: self.is_14_bit,
                    is_registered: self.is_registered,
                }
            }
            PolyphonicKeyPressureAmount => Source::PolyphonicKeyPressureAmount {
                channel,
                key_number: seven_bit_number()?.map(KeyNumber::new),
            },
        };
        Ok(source)
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct ModeData {
    #[serde(rename = "minSourceValue")]
    pub min_source_value: f64,
    #[serde(rename = "maxSourceValue")]
    pub max_source_value: f64,
    #[serde(rename = "minTargetValue")]
    pub min_target_value: f64,
    #[serde(rename = "maxTargetValue")]
    pub max_target_value: f64,
    #[serde(rename = "minStepSize")]
    pub min_step_size: f64,
    #[serde(rename = "maxStepSize")]
    pub max_step_size: f64,
    #[serde(rename = "minTargetJump")]
    pub min_target_jump: f64,
    #[serde(rename = "maxTargetJump")]
    pub max_target_jump: f64,
    pub reverse: bool,
    pub rotate: bool,
    #[serde(rename = "roundTargetValue")]
    pub round_target_value: bool,
    #[serde(rename = "scaleMode")]
    pub scale_mode: bool,
    #[serde(rename = "ignoreOutOfRangeSourceValues")]
    pub ignore_out_of_range_source_values: bool,
    #[serde(rename = "controlTransformation")]
    pub control_transformation: String,
    #[serde(rename = "feedbackTransformation")]
    pub feedback_transformation: String,
}

impl Default for ModeData {
    fn default() -> Self {
        Self {
            min_source_value: 0.0,
            max_source_value: 1.0,
            min_target_value: 0.0,
            max_target_value: 1.0,
            min_step_size: 0.0,
            max_step_size: 1.0,
            min_target_jump: 0.0,
            max_target_jump: 1.0,
            reverse: false,
            rotate: false,
            round_target_value: false,
            scale_mode: false,
            ignore_out_of_range_source_values: false,
            control_transformation: String::new(),
            feedback_transformation: String::new(),
        }
    }
}

impl ModeData {
    pub fn create_mode(&self) -> Result<Mode<ExpressionTransformation>, ConfigError> {
        let mode = Mode {
            source_value_interval: unit_interval(
                self.min_source_value,
                self.max_source_value,
                "source value interval",
            )?,
            target_value_interval: unit_interval(
                self.min_target_value,
                self.max_target_value,
                "target value interval",
            )?,
            step_size_interval: unit_interval(
                self.min_step_size,
                self.max_step_size,
                "step size interval",
            )?,
            jump_interval: unit_interval(
                self.min_target_jump,
                self.max_target_jump,
                "target jump interval",
            )?,
            reverse: self.reverse,
            rotate: self.rotate,
            round_target_value: self.round_target_value,
            scale_mode: self.scale_mode,
            ignore_out_of_range_source_values: self.ignore_out_of_range_source_values,
            control_transformation: compile_transformation(
                &self.control_transformation,
                OutputVariable::Y,
                "control transformation",
            )?,
            feedback_transformation: compile_transformation(
                &self.feedback_transformation,
                OutputVariable::X,
                "feedback transformation",
            )?,
            previous_target_value: None,
        };
        Ok(mode)
    }
}

fn unit_interval(
    min: f64,
    max: f64,
    what: &'static str,
) -> Result<Interval<UnitValue>, ConfigError> {
    if !UnitValue::is_valid(min) || !UnitValue::is_valid(max) {
        return Err(ConfigError::InvalidMode(what));
    }
    Interval::try_new(UnitValue::new(min), UnitValue::new(max))
        .map_err(|_| ConfigError::InvalidMode(what))
}

fn compile_transformation(
    expression: &str,
    output_var: OutputVariable,
    what: &'static str,
) -> Result<Option<ExpressionTransformation>, ConfigError> {
    if expression.trim().is_empty() {
        return Ok(None);
    }
    ExpressionTransformation::compile(expression, output_var)
        .map(Some)
        .map_err(|e| ConfigError::InvalidExpression(what, e.to_string()))
}

#[derive(Copy, Clone, Eq, PartialEq, Debug, Serialize_repr, Deserialize_repr)]
#[repr(u8)]
pub enum TargetType {
    TrackVolume = 0,
    TrackPan = 1,
    FxParameter = 2,
    Action = 3,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct TargetData {
    pub r#type: TargetType,
    #[serde(default, rename = "trackIndex")]
    pub track_index: u32,
    #[serde(default, rename = "fxIndex")]
    pub fx_index: u32,
    #[serde(default, rename = "paramIndex")]
    pub param_index: u32,
    #[serde(default, rename = "commandId")]
    pub command_id: u32,
}

impl TargetData {
    pub fn create_target_ref(&self) -> TargetRef {
        use TargetType::*;
        match self.r#type {
            TrackVolume => TargetRef::TrackVolume {
                track_index: self.track_index,
            },
            TrackPan => TargetRef::TrackPan {
                track_index: self.track_index,
            },
            FxParameter => TargetRef::FxParameter {
                track_index: self.track_index,
                fx_index: self.fx_index,
                param_index: self.param_index,
            },
            Action => TargetRef::Action {
                command_id: self.command_id,
            },
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ActivationData {
    #[serde(rename = "activationType")]
    pub activation_type: ActivationType,
    #[serde(default, rename = "modifierConditions")]
    pub modifier_conditions: Vec<ModifierCondition>,
    #[serde(default)]
    pub expression: String,
}

impl Default for ActivationData {
    fn default() -> Self {
        Self {
            activation_type: ActivationType::Always,
            modifier_conditions: vec![],
            expression: String::new(),
        }
    }
}

impl ActivationData {
    pub fn create_activation_condition(&self) -> Result<ActivationCondition, ConfigError> {
        use ActivationType::*;
        let condition = match self.activation_type {
            Always => ActivationCondition::Always,
            Modifiers => ActivationCondition::Modifiers(self.modifier_conditions.clone()),
            TargetPresent => ActivationCondition::TargetPresent,
            Expression => ActivationCondition::Expression(
                ExpressionCondition::compile(&self.expression).map_err(|e| {
                    ConfigError::InvalidExpression("activation condition", e.to_string())
                })?,
            ),
        };
        Ok(condition)
    }
}
