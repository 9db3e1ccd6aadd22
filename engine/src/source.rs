use crate::{AbsoluteValue, Fraction, UnitValue};
use helgoboss_midi::{
    Channel, ControlChange14BitMessage, ControllerNumber, KeyNumber, ParameterNumberMessage,
    RawShortMessage, ShortMessage, ShortMessageFactory, StructuredShortMessage, U14, U7,
};

/// An inbound or outbound control event.
///
/// Composite kinds (14-bit CC, (N)RPN) are assembled from short messages by
/// the real-time layer before they get here.
#[derive(Copy, Clone, PartialEq, Debug)]
pub enum SourceValue {
    Plain(RawShortMessage),
    ControlChange14Bit(ControlChange14BitMessage),
    ParameterNumber(ParameterNumberMessage),
}

impl SourceValue {
    /// Coarse pattern class, used to narrow the mapping scan. `None` for
    /// messages that can't drive any source (e.g. system real-time).
    pub fn class(&self) -> Option<SourceClass> {
        use SourceValue::*;
        match self {
            Plain(msg) => {
                use StructuredShortMessage::*;
                match msg.to_structured() {
                    NoteOn { .. } | NoteOff { .. } => Some(SourceClass::Note),
                    PolyphonicKeyPressure { .. } => Some(SourceClass::PolyAftertouch),
                    ControlChange { .. } => Some(SourceClass::ControlChange),
                    ProgramChange { .. } => Some(SourceClass::ProgramChange),
                    ChannelPressure { .. } => Some(SourceClass::ChannelPressure),
                    PitchBendChange { .. } => Some(SourceClass::PitchBend),
                    _ => None,
                }
            }
            ControlChange14Bit(_) => Some(SourceClass::ControlChange),
            ParameterNumber(_) => Some(SourceClass::ParameterNumber),
        }
    }
}

/// Coarse source pattern class. Sources and source values of the same class
/// are candidates for matching each other.
#[derive(Copy, Clone, Eq, PartialEq, Hash, Debug)]
pub enum SourceClass {
    Note,
    PolyAftertouch,
    ControlChange,
    ProgramChange,
    ChannelPressure,
    PitchBend,
    ParameterNumber,
}

/// A source pattern for matching and decoding inbound control events.
///
/// `None` fields act as wildcards. Immutable once the owning mapping is
/// constructed.
#[derive(Copy, Clone, Eq, PartialEq, Debug)]
pub enum Source {
    NoteVelocity {
        channel: Option<Channel>,
        key_number: Option<KeyNumber>,
    },
    NoteKeyNumber {
        channel: Option<Channel>,
    },
    PolyphonicKeyPressureAmount {
        channel: Option<Channel>,
        key_number: Option<KeyNumber>,
    },
    ControlChangeValue {
        channel: Option<Channel>,
        controller_number: Option<ControllerNumber>,
    },
    ControlChange14BitValue {
        channel: Option<Channel>,
        msb_controller_number: Option<ControllerNumber>,
    },
    ProgramChangeNumber {
        channel: Option<Channel>,
    },
    ChannelPressureAmount {
        channel: Option<Channel>,
    },
    PitchBendChangeValue {
        channel: Option<Channel>,
    },
    ParameterNumberValue {
        channel: Option<Channel>,
        number: Option<U14>,
        is_14_bit: Option<bool>,
        is_registered: Option<bool>,
    },
}

impl Source {
    pub fn class(&self) -> SourceClass {
        use Source::*;
        match self {
            NoteVelocity { .. } | NoteKeyNumber { .. } => SourceClass::Note,
            PolyphonicKeyPressureAmount { .. } => SourceClass::PolyAftertouch,
            ControlChangeValue { .. } | ControlChange14BitValue { .. } => {
                SourceClass::ControlChange
            }
            ProgramChangeNumber { .. } => SourceClass::ProgramChange,
            ChannelPressureAmount { .. } => SourceClass::ChannelPressure,
            PitchBendChangeValue { .. } => SourceClass::PitchBend,
            ParameterNumberValue { .. } => SourceClass::ParameterNumber,
        }
    }

    /// Checks whether the given event matches this source and returns the
    /// decoded, normalized value if so.
    pub fn control(&self, value: &SourceValue) -> Option<AbsoluteValue> {
        use Source::*;
        match value {
            SourceValue::Plain(msg) => {
                use StructuredShortMessage::*;
                match (self, msg.to_structured()) {
                    (
                        NoteVelocity {
                            channel,
                            key_number,
                        },
                        NoteOn {
                            channel: ch,
                            key_number: kn,
                            velocity,
                        },
                    ) if matches(channel, ch) && matches(key_number, kn) => {
                        // Note-on with velocity zero has note-off semantics.
                        Some(abs_7_bit(velocity))
                    }
                    (
                        NoteVelocity {
                            channel,
                            key_number,
                        },
                        NoteOff {
                            channel: ch,
                            key_number: kn,
                            ..
                        },
                    ) if matches(channel, ch) && matches(key_number, kn) => {
                        Some(AbsoluteValue::Discrete(Fraction::new(0, 127)))
                    }
                    (
                        NoteKeyNumber { channel },
                        NoteOn {
                            channel: ch,
                            key_number,
                            velocity,
                        },
                    ) if matches(channel, ch) && velocity > U7::MIN => Some(
                        AbsoluteValue::Discrete(Fraction::new(key_number.get() as u32, 127)),
                    ),
                    (
                        PolyphonicKeyPressureAmount {
                            channel,
                            key_number,
                        },
                        PolyphonicKeyPressure {
                            channel: ch,
                            key_number: kn,
                            pressure_amount,
                        },
                    ) if matches(channel, ch) && matches(key_number, kn) => {
                        Some(abs_7_bit(pressure_amount))
                    }
                    (
                        ControlChangeValue {
                            channel,
                            controller_number,
                        },
                        ControlChange {
                            channel: ch,
                            controller_number: cn,
                            control_value,
                        },
                    ) if matches(channel, ch) && matches(controller_number, cn) => {
                        Some(abs_7_bit(control_value))
                    }
                    (
                        ProgramChangeNumber { channel },
                        ProgramChange {
                            channel: ch,
                            program_number,
                        },
                    ) if matches(channel, ch) => Some(abs_7_bit(program_number)),
                    (
                        ChannelPressureAmount { channel },
                        ChannelPressure {
                            channel: ch,
                            pressure_amount,
                        },
                    ) if matches(channel, ch) => Some(abs_7_bit(pressure_amount)),
                    (
                        PitchBendChangeValue { channel },
                        PitchBendChange {
                            channel: ch,
                            pitch_bend_value,
                        },
                    ) if matches(channel, ch) => Some(abs_14_bit(pitch_bend_value)),
                    _ => None,
                }
            }
            SourceValue::ControlChange14Bit(msg) => match self {
                ControlChange14BitValue {
                    channel,
                    msb_controller_number,
                } if matches(channel, msg.channel())
                    && matches(msb_controller_number, msg.msb_controller_number()) =>
                {
                    Some(abs_14_bit(msg.value()))
                }
                _ => None,
            },
            SourceValue::ParameterNumber(msg) => match self {
                ParameterNumberValue {
                    channel,
                    number,
                    is_14_bit,
                    is_registered,
                } if matches(channel, msg.channel())
                    && matches(number, msg.number())
                    && matches(is_14_bit, msg.is_14_bit())
                    && matches(is_registered, msg.is_registered()) =>
                {
                    let max = if msg.is_14_bit() { 16383 } else { 127 };
                    Some(AbsoluteValue::Discrete(Fraction::new(
                        msg.value().get() as u32,
                        max,
                    )))
                }
                _ => None,
            },
        }
    }

    /// Returns whether the given short message could contribute to a value of
    /// this source, even if only as part of a composite message. Used for
    /// filtering out events that belong to a matched composite source.
    pub fn consumes(&self, msg: RawShortMessage) -> bool {
        use Source::*;
        use StructuredShortMessage::*;
        match (self, msg.to_structured()) {
            (
                ControlChange14BitValue {
                    channel,
                    msb_controller_number,
                },
                ControlChange {
                    channel: ch,
                    controller_number: cn,
                    ..
                },
            ) => {
                matches(channel, ch)
                    && match msb_controller_number {
                        None => cn.get() < 64,
                        Some(msb) => cn == *msb || cn.get() == msb.get() + 32,
                    }
            }
            (
                ParameterNumberValue { channel, .. },
                ControlChange {
                    channel: ch,
                    controller_number: cn,
                    ..
                },
            ) => {
                matches(channel, ch)
                    && matches!(cn.get(), 6 | 38 | 96 | 97 | 98 | 99 | 100 | 101)
            }
            _ => self.control(&SourceValue::Plain(msg)).is_some(),
        }
    }

    /// Encodes the given normalized value as an outbound event suitable for
    /// reflecting target state on the originating device.
    ///
    /// Returns `None` for sources that are too unspecific to address a
    /// device control (wildcard channel/number).
    pub fn feedback(&self, value: UnitValue) -> Option<SourceValue> {
        use Source::*;
        let source_value = match self {
            NoteVelocity {
                channel,
                key_number,
            } => SourceValue::Plain(RawShortMessage::note_on(
                (*channel)?,
                (*key_number)?,
                denormalize_u7(value),
            )),
            NoteKeyNumber { channel } => SourceValue::Plain(RawShortMessage::note_on(
                (*channel)?,
                KeyNumber::new(denormalize_u7(value).get()),
                U7::MAX,
            )),
            PolyphonicKeyPressureAmount {
                channel,
                key_number,
            } => SourceValue::Plain(RawShortMessage::polyphonic_key_pressure(
                (*channel)?,
                (*key_number)?,
                denormalize_u7(value),
            )),
            ControlChangeValue {
                channel,
                controller_number,
            } => SourceValue::Plain(RawShortMessage::control_change(
                (*channel)?,
                (*controller_number)?,
                denormalize_u7(value),
            )),
            ControlChange14BitValue {
                channel,
                msb_controller_number,
            } => SourceValue::ControlChange14Bit(ControlChange14BitMessage::new(
                (*channel)?,
                (*msb_controller_number)?,
                denormalize_u14(value),
            )),
            ProgramChangeNumber { channel } => SourceValue::Plain(
                RawShortMessage::program_change((*channel)?, denormalize_u7(value)),
            ),
            ChannelPressureAmount { channel } => SourceValue::Plain(
                RawShortMessage::channel_pressure((*channel)?, denormalize_u7(value)),
            ),
            PitchBendChangeValue { channel } => SourceValue::Plain(
                RawShortMessage::pitch_bend_change((*channel)?, denormalize_u14(value)),
            ),
            ParameterNumberValue {
                channel,
                number,
                is_14_bit,
                is_registered,
            } => {
                let ch = (*channel)?;
                let number = (*number)?;
                let msg = match ((*is_14_bit)?, (*is_registered)?) {
                    (true, true) => ParameterNumberMessage::registered_14_bit(
                        ch,
                        number,
                        denormalize_u14(value),
                    ),
                    (true, false) => ParameterNumberMessage::non_registered_14_bit(
                        ch,
                        number,
                        denormalize_u14(value),
                    ),
                    (false, true) => ParameterNumberMessage::registered_7_bit(
                        ch,
                        number,
                        denormalize_u7(value),
                    ),
                    (false, false) => ParameterNumberMessage::non_registered_7_bit(
                        ch,
                        number,
                        denormalize_u7(value),
                    ),
                };
                SourceValue::ParameterNumber(msg)
            }
        };
        Some(source_value)
    }
}

fn matches<T: PartialEq + Copy>(pattern: &Option<T>, actual: T) -> bool {
    match pattern {
        None => true,
        Some(p) => *p == actual,
    }
}

fn abs_7_bit(value: U7) -> AbsoluteValue {
    AbsoluteValue::Discrete(Fraction::new(value.get() as u32, 127))
}

fn abs_14_bit(value: U14) -> AbsoluteValue {
    AbsoluteValue::Discrete(Fraction::new(value.get() as u32, 16383))
}

fn denormalize_u7(value: UnitValue) -> U7 {
    U7::new((value.get() * 127.0).round() as u8)
}

fn denormalize_u14(value: UnitValue) -> U14 {
    U14::new((value.get() * 16383.0).round() as u16)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;
    use helgoboss_midi::test_util::{channel, controller_number, key_number, u14, u7};

    #[test]
    fn note_velocity_decoding() {
        // Given
        let source = Source::NoteVelocity {
            channel: Some(channel(0)),
            key_number: Some(key_number(64)),
        };
        // When
        let on = source.control(&SourceValue::Plain(RawShortMessage::note_on(
            channel(0),
            key_number(64),
            u7(100),
        )));
        let off = source.control(&SourceValue::Plain(RawShortMessage::note_off(
            channel(0),
            key_number(64),
            u7(50),
        )));
        let zero_velocity = source.control(&SourceValue::Plain(RawShortMessage::note_on(
            channel(0),
            key_number(64),
            u7(0),
        )));
        let other_key = source.control(&SourceValue::Plain(RawShortMessage::note_on(
            channel(0),
            key_number(65),
            u7(100),
        )));
        // Then
        assert_abs_diff_eq!(on.unwrap().to_unit_value().get(), 100.0 / 127.0);
        assert!(off.unwrap().is_zero());
        assert!(zero_velocity.unwrap().is_zero());
        assert_eq!(other_key, None);
    }

    #[test]
    fn wildcard_channel_matches_all_channels() {
        // Given
        let source = Source::ControlChangeValue {
            channel: None,
            controller_number: Some(controller_number(7)),
        };
        // When
        let ch_0 = source.control(&SourceValue::Plain(RawShortMessage::control_change(
            channel(0),
            controller_number(7),
            u7(64),
        )));
        let ch_15 = source.control(&SourceValue::Plain(RawShortMessage::control_change(
            channel(15),
            controller_number(7),
            u7(64),
        )));
        // Then
        assert_abs_diff_eq!(ch_0.unwrap().to_unit_value().get(), 64.0 / 127.0);
        assert_abs_diff_eq!(ch_15.unwrap().to_unit_value().get(), 64.0 / 127.0);
    }

    #[test]
    fn cc_14_bit_decoding() {
        // Given
        let source = Source::ControlChange14BitValue {
            channel: Some(channel(2)),
            msb_controller_number: Some(controller_number(2)),
        };
        // When
        let msg = ControlChange14BitMessage::new(channel(2), controller_number(2), u14(10000));
        let result = source.control(&SourceValue::ControlChange14Bit(msg));
        // Then
        assert_abs_diff_eq!(
            result.unwrap().to_unit_value().get(),
            10000.0 / 16383.0
        );
    }

    #[test]
    fn rpn_decoding_distinguishes_registered_and_bit_width() {
        // Given
        let source = Source::ParameterNumberValue {
            channel: Some(channel(0)),
            number: Some(u14(420)),
            is_14_bit: Some(false),
            is_registered: Some(true),
        };
        // When
        let matching = source.control(&SourceValue::ParameterNumber(
            ParameterNumberMessage::registered_7_bit(channel(0), u14(420), u7(64)),
        ));
        let wrong_kind = source.control(&SourceValue::ParameterNumber(
            ParameterNumberMessage::non_registered_7_bit(channel(0), u14(420), u7(64)),
        ));
        // Then
        assert_abs_diff_eq!(matching.unwrap().to_unit_value().get(), 64.0 / 127.0);
        assert_eq!(wrong_kind, None);
    }

    #[test]
    fn feedback_encodes_to_source_shape() {
        // Given
        let source = Source::ControlChangeValue {
            channel: Some(channel(3)),
            controller_number: Some(controller_number(10)),
        };
        // When
        let result = source.feedback(UnitValue::new(0.5)).unwrap();
        // Then
        assert_eq!(
            result,
            SourceValue::Plain(RawShortMessage::control_change(
                channel(3),
                controller_number(10),
                u7(64)
            ))
        );
    }

    #[test]
    fn feedback_requires_concrete_address() {
        // Given
        let source = Source::ControlChangeValue {
            channel: None,
            controller_number: Some(controller_number(10)),
        };
        // When
        let result = source.feedback(UnitValue::new(0.5));
        // Then
        assert_eq!(result, None);
    }

    #[test]
    fn pn_source_consumes_data_entry_messages() {
        // Given
        let source = Source::ParameterNumberValue {
            channel: Some(channel(0)),
            number: Some(u14(99)),
            is_14_bit: Some(true),
            is_registered: Some(false),
        };
        // When
        let data_entry = RawShortMessage::control_change(channel(0), controller_number(6), u7(2));
        let unrelated = RawShortMessage::control_change(channel(0), controller_number(7), u7(2));
        // Then
        assert!(source.consumes(data_entry));
        assert!(!source.consumes(unrelated));
    }
}
