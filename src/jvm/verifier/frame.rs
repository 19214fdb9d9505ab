use super::VerificationType;
use crate::jvm::class_file::{BufWriter, ClassIndex, ConstantPool, Serialize};
use crate::jvm::code::MethodInfo;
use crate::jvm::{BinaryName, Error, RefType};
use crate::util::OffsetVec;
use byteorder::{BigEndian, ReadBytesExt};
use std::io::Cursor;

/// Snapshot of the stack and local variables at a point in the bytecode
///
/// Locals and stack are in their compact form: `long` and `double` are single entries (which
/// occupy two slots, hence the `OffsetVec`), and trailing unusable locals are omitted.
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct Frame<Cls, U> {
    /// Local variables in scope
    pub locals: OffsetVec<VerificationType<Cls, U>>,

    /// Types of values on the stack
    pub stack: OffsetVec<VerificationType<Cls, U>>,
}

impl<Cls, U> Default for Frame<Cls, U> {
    fn default() -> Self {
        Frame {
            locals: OffsetVec::new(),
            stack: OffsetVec::new(),
        }
    }
}

impl<Cls, U> Frame<Cls, U> {
    /// Convert every type in the frame
    pub fn try_map<C2, U2, E>(
        &self,
        mut map: impl FnMut(&VerificationType<Cls, U>) -> Result<VerificationType<C2, U2>, E>,
    ) -> Result<Frame<C2, U2>, E> {
        Ok(Frame {
            locals: self
                .locals
                .values()
                .map(&mut map)
                .collect::<Result<_, _>>()?,
            stack: self.stack.values().map(&mut map).collect::<Result<_, _>>()?,
        })
    }
}

impl<U> Frame<RefType, U> {
    /// Frame on entry to a method: just the receiver and the parameters
    ///
    /// Inside a constructor (other than the one of `java.lang.Object`), the receiver starts out
    /// as `UninitializedThis`.
    pub fn initial(method: &MethodInfo) -> Frame<RefType, U> {
        let mut locals = OffsetVec::new();
        if !method.is_static() {
            if method.name.is_init() && method.class != BinaryName::OBJECT {
                locals.push(VerificationType::UninitializedThis);
            } else {
                locals.push(VerificationType::Object(RefType::Object(
                    method.class.clone(),
                )));
            }
        }
        for parameter in &method.descriptor.parameters {
            locals.push(VerificationType::from(parameter.clone()));
        }
        Frame {
            locals,
            stack: OffsetVec::new(),
        }
    }
}

impl<Cls: Clone + PartialEq, U: Clone + PartialEq> Frame<Cls, U> {
    /// Compute a stack map frame for this frame, given the previous frame
    ///
    /// This will fall back to the `Full` option using [`Self::full_stack_map_frame`] only if none
    /// of the other stack map frame variants are enough to encode the transition.
    pub fn stack_map_frame(&self, offset_delta: u16, previous_frame: &Self) -> StackMapFrame<Cls, U> {
        match self.stack.len() {
            0 => {
                let this_locals_len = self.locals.len();
                let prev_locals_len = previous_frame.locals.len();

                if this_locals_len <= prev_locals_len {
                    let len_difference = prev_locals_len - this_locals_len;
                    let this_is_prefix_of_prev = self
                        .locals
                        .values()
                        .zip(previous_frame.locals.values())
                        .all(|(t1, t2)| t1 == t2);

                    if len_difference < 4 && this_is_prefix_of_prev {
                        if len_difference == 0 {
                            return StackMapFrame::SameLocalsNoStack { offset_delta };
                        } else {
                            return StackMapFrame::ChopLocalsNoStack {
                                offset_delta,
                                chopped_k: len_difference as u8,
                            };
                        }
                    }
                } else if this_locals_len - prev_locals_len < 4 {
                    let prev_is_prefix_of_this = previous_frame
                        .locals
                        .values()
                        .zip(self.locals.values())
                        .all(|(t1, t2)| t1 == t2);

                    if prev_is_prefix_of_this {
                        return StackMapFrame::AppendLocalsNoStack {
                            offset_delta,
                            locals: self
                                .locals
                                .values()
                                .skip(prev_locals_len)
                                .cloned()
                                .collect(),
                        };
                    }
                }
            }
            1 if self.locals == previous_frame.locals => {
                if let Some(stack) = self.stack.last() {
                    return StackMapFrame::SameLocalsOneStack {
                        offset_delta,
                        stack: stack.clone(),
                    };
                }
            }
            _ => (),
        }

        self.full_stack_map_frame(offset_delta)
    }

    /// Compute a `Full` stack map frame
    pub fn full_stack_map_frame(&self, offset_delta: u16) -> StackMapFrame<Cls, U> {
        StackMapFrame::Full {
            offset_delta,
            stack: self.stack.values().cloned().collect(),
            locals: self.locals.values().cloned().collect(),
        }
    }
}

/// Compact `stack_map_frame` entry, relative to the previous frame
///
/// [0]: https://docs.oracle.com/javase/specs/jvms/se16/html/jvms-4.html#jvms-4.7.4
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StackMapFrame<Cls, U> {
    /// Frame has the same locals as the previous frame and number of stack items is zero
    /// Tags: 0-63 or 251
    SameLocalsNoStack { offset_delta: u16 },

    /// Frame has the same locals as the previous frame and number of stack items is one
    /// Tags: 64-127 or 247
    SameLocalsOneStack {
        offset_delta: u16,
        stack: VerificationType<Cls, U>,
    },

    /// Frame is like the previous frame, but without the last `chopped_k` locals
    ///
    /// Note: `chopped_k` must be in the range 1 to 3 inclusive
    /// Tags: 248-250
    ChopLocalsNoStack { offset_delta: u16, chopped_k: u8 },

    /// Frame is like the previous frame, but with extra locals
    /// Tags: 252-254
    AppendLocalsNoStack {
        offset_delta: u16,
        locals: Vec<VerificationType<Cls, U>>,
    },

    /// Frame has exactly the locals and stack specified
    /// Tag: 255
    Full {
        offset_delta: u16,
        locals: Vec<VerificationType<Cls, U>>,
        stack: Vec<VerificationType<Cls, U>>,
    },
}

impl<Cls: Clone, U: Clone> StackMapFrame<Cls, U> {
    pub fn offset_delta(&self) -> u16 {
        match self {
            StackMapFrame::SameLocalsNoStack { offset_delta }
            | StackMapFrame::SameLocalsOneStack { offset_delta, .. }
            | StackMapFrame::ChopLocalsNoStack { offset_delta, .. }
            | StackMapFrame::AppendLocalsNoStack { offset_delta, .. }
            | StackMapFrame::Full { offset_delta, .. } => *offset_delta,
        }
    }

    /// Convert every type mentioned in the frame
    pub fn try_map<C2, U2, E>(
        &self,
        mut map: impl FnMut(&VerificationType<Cls, U>) -> Result<VerificationType<C2, U2>, E>,
    ) -> Result<StackMapFrame<C2, U2>, E> {
        Ok(match self {
            StackMapFrame::SameLocalsNoStack { offset_delta } => StackMapFrame::SameLocalsNoStack {
                offset_delta: *offset_delta,
            },
            StackMapFrame::SameLocalsOneStack {
                offset_delta,
                stack,
            } => StackMapFrame::SameLocalsOneStack {
                offset_delta: *offset_delta,
                stack: map(stack)?,
            },
            StackMapFrame::ChopLocalsNoStack {
                offset_delta,
                chopped_k,
            } => StackMapFrame::ChopLocalsNoStack {
                offset_delta: *offset_delta,
                chopped_k: *chopped_k,
            },
            StackMapFrame::AppendLocalsNoStack {
                offset_delta,
                locals,
            } => StackMapFrame::AppendLocalsNoStack {
                offset_delta: *offset_delta,
                locals: locals.iter().map(&mut map).collect::<Result<_, _>>()?,
            },
            StackMapFrame::Full {
                offset_delta,
                locals,
                stack,
            } => StackMapFrame::Full {
                offset_delta: *offset_delta,
                locals: locals.iter().map(&mut map).collect::<Result<_, _>>()?,
                stack: stack.iter().map(&mut map).collect::<Result<_, _>>()?,
            },
        })
    }

    /// Reconstruct the full frame, given the frame this one is relative to
    pub fn apply(&self, previous_frame: &Frame<Cls, U>) -> Result<Frame<Cls, U>, Error> {
        Ok(match self {
            StackMapFrame::SameLocalsNoStack { .. } => Frame {
                locals: previous_frame.locals.clone(),
                stack: OffsetVec::new(),
            },
            StackMapFrame::SameLocalsOneStack { stack, .. } => Frame {
                locals: previous_frame.locals.clone(),
                stack: OffsetVec::from([stack.clone()]),
            },
            StackMapFrame::ChopLocalsNoStack { chopped_k, .. } => {
                let kept = previous_frame
                    .locals
                    .len()
                    .checked_sub(*chopped_k as usize)
                    .ok_or(Error::MalformedClass("chop frame removes too many locals"))?;
                let mut locals = previous_frame.locals.clone();
                locals.truncate(kept);
                Frame {
                    locals,
                    stack: OffsetVec::new(),
                }
            }
            StackMapFrame::AppendLocalsNoStack { locals, .. } => {
                let mut all_locals = previous_frame.locals.clone();
                all_locals.extend(locals.iter().cloned());
                Frame {
                    locals: all_locals,
                    stack: OffsetVec::new(),
                }
            }
            StackMapFrame::Full { locals, stack, .. } => Frame {
                locals: locals.iter().cloned().collect(),
                stack: stack.iter().cloned().collect(),
            },
        })
    }
}

impl Serialize for StackMapFrame<ClassIndex, u16> {
    fn serialize(&self, writer: &mut BufWriter) -> Result<(), Error> {
        match self {
            // `same_frame` and `same_frame_extended`
            StackMapFrame::SameLocalsNoStack { offset_delta } => {
                if *offset_delta <= 63 {
                    writer.write_u1(*offset_delta as u8);
                } else {
                    writer.write_u1(251);
                    writer.write_u2(*offset_delta);
                }
            }

            // `same_locals_1_stack_item_frame` and `same_locals_1_stack_item_frame_extended`
            StackMapFrame::SameLocalsOneStack {
                offset_delta,
                stack,
            } => {
                if *offset_delta <= 63 {
                    writer.write_u1(*offset_delta as u8 + 64);
                } else {
                    writer.write_u1(247);
                    writer.write_u2(*offset_delta);
                }
                stack.serialize(writer)?;
            }

            // `chop_frame`
            StackMapFrame::ChopLocalsNoStack {
                offset_delta,
                chopped_k,
            } => {
                if !(1..=3).contains(chopped_k) {
                    return Err(Error::MalformedClass("chop frames remove 1 to 3 locals"));
                }
                writer.write_u1(251 - chopped_k);
                writer.write_u2(*offset_delta);
            }

            // `append_frame`
            StackMapFrame::AppendLocalsNoStack {
                offset_delta,
                locals,
            } => {
                let added_k = locals.len();
                if !(1..=3).contains(&added_k) {
                    return Err(Error::MalformedClass("append frames add 1 to 3 locals"));
                }
                writer.write_u1(251 + added_k as u8);
                writer.write_u2(*offset_delta);
                for local in locals {
                    local.serialize(writer)?;
                }
            }

            // `full_frame`
            StackMapFrame::Full {
                offset_delta,
                locals,
                stack,
            } => {
                writer.write_u1(255);
                writer.write_u2(*offset_delta);
                locals.serialize(writer)?;
                stack.serialize(writer)?;
            }
        };
        Ok(())
    }
}

impl StackMapFrame<ClassIndex, u16> {
    /// Read one `stack_map_frame` entry
    pub fn read(cursor: &mut Cursor<&[u8]>, pool: &ConstantPool) -> Result<Self, Error> {
        let truncated = |_| Error::MalformedClass("truncated stack map frame");
        let read_types = |cursor: &mut Cursor<&[u8]>, count: usize| {
            (0..count)
                .map(|_| VerificationType::read(cursor, pool))
                .collect::<Result<Vec<_>, _>>()
        };

        let tag = cursor.read_u8().map_err(truncated)?;
        Ok(match tag {
            0..=63 => StackMapFrame::SameLocalsNoStack {
                offset_delta: tag as u16,
            },
            64..=127 => StackMapFrame::SameLocalsOneStack {
                offset_delta: tag as u16 - 64,
                stack: VerificationType::read(cursor, pool)?,
            },
            128..=246 => return Err(Error::MalformedClass("reserved stack map frame tag")),
            247 => {
                let offset_delta = cursor.read_u16::<BigEndian>().map_err(truncated)?;
                StackMapFrame::SameLocalsOneStack {
                    offset_delta,
                    stack: VerificationType::read(cursor, pool)?,
                }
            }
            248..=250 => StackMapFrame::ChopLocalsNoStack {
                offset_delta: cursor.read_u16::<BigEndian>().map_err(truncated)?,
                chopped_k: 251 - tag,
            },
            251 => StackMapFrame::SameLocalsNoStack {
                offset_delta: cursor.read_u16::<BigEndian>().map_err(truncated)?,
            },
            252..=254 => {
                let offset_delta = cursor.read_u16::<BigEndian>().map_err(truncated)?;
                StackMapFrame::AppendLocalsNoStack {
                    offset_delta,
                    locals: read_types(cursor, (tag - 251) as usize)?,
                }
            }
            255 => {
                let offset_delta = cursor.read_u16::<BigEndian>().map_err(truncated)?;
                let locals_count = cursor.read_u16::<BigEndian>().map_err(truncated)?;
                let locals = read_types(cursor, locals_count as usize)?;
                let stack_count = cursor.read_u16::<BigEndian>().map_err(truncated)?;
                let stack = read_types(cursor, stack_count as usize)?;
                StackMapFrame::Full {
                    offset_delta,
                    locals,
                    stack,
                }
            }
        })
    }

    /// Read the payload of a `StackMapTable` attribute
    pub fn read_table(payload: &[u8], pool: &ConstantPool) -> Result<Vec<Self>, Error> {
        let mut cursor = Cursor::new(payload);
        let count = cursor
            .read_u16::<BigEndian>()
            .map_err(|_| Error::MalformedClass("truncated StackMapTable"))?;
        let frames = (0..count)
            .map(|_| Self::read(&mut cursor, pool))
            .collect::<Result<Vec<_>, _>>()?;
        if cursor.position() as usize != payload.len() {
            return Err(Error::MalformedClass("trailing bytes in StackMapTable"));
        }
        Ok(frames)
    }
}

/// Compact a sequence of full frames (sorted by strictly increasing offset)
pub fn encode_stack_map_table<Cls: Clone + PartialEq, U: Clone + PartialEq>(
    initial_frame: &Frame<Cls, U>,
    frames: &[(u16, Frame<Cls, U>)],
) -> Result<Vec<StackMapFrame<Cls, U>>, Error> {
    let mut encoded = Vec::with_capacity(frames.len());
    let mut previous: Option<u16> = None;
    let mut previous_frame = initial_frame;

    for (offset, frame) in frames {
        let offset_delta = match previous {
            None => *offset,
            Some(previous) if previous < *offset => offset - previous - 1,
            Some(previous) => {
                return Err(Error::FrameOffsetsNotIncreasing {
                    previous,
                    offset: *offset,
                })
            }
        };
        encoded.push(frame.stack_map_frame(offset_delta, previous_frame));
        previous = Some(*offset);
        previous_frame = frame;
    }

    Ok(encoded)
}

/// Inverse of [`encode_stack_map_table`]: recover every full frame along with its offset
pub fn decode_stack_map_table<Cls: Clone, U: Clone>(
    initial_frame: &Frame<Cls, U>,
    frames: &[StackMapFrame<Cls, U>],
) -> Result<Vec<(u16, Frame<Cls, U>)>, Error> {
    let mut decoded: Vec<(u16, Frame<Cls, U>)> = Vec::with_capacity(frames.len());

    for frame in frames {
        let (offset, full_frame) = match decoded.last() {
            None => (frame.offset_delta(), frame.apply(initial_frame)?),
            Some((previous, previous_frame)) => {
                let offset = previous
                    .checked_add(frame.offset_delta())
                    .and_then(|offset| offset.checked_add(1))
                    .ok_or(Error::MalformedClass("stack map frame offset overflows"))?;
                (offset, frame.apply(previous_frame)?)
            }
        };
        decoded.push((offset, full_frame));
    }

    Ok(decoded)
}

#[cfg(test)]
mod test {
    use super::*;

    type TestFrame = Frame<char, u16>;
    type TestType = VerificationType<char, u16>;

    fn frame(locals: Vec<TestType>, stack: Vec<TestType>) -> TestFrame {
        Frame {
            locals: locals.into_iter().collect(),
            stack: stack.into_iter().collect(),
        }
    }

    use VerificationType::{Double, Float, Integer, Long, Object};

    #[test]
    fn append_is_preferred_over_full() {
        let previous = frame(vec![Integer, Integer], vec![]);
        let next = frame(vec![Integer, Integer, Float], vec![]);
        assert_eq!(
            next.stack_map_frame(3, &previous),
            StackMapFrame::AppendLocalsNoStack {
                offset_delta: 3,
                locals: vec![Float],
            }
        );
    }

    #[test]
    fn one_stack_item() {
        let previous = frame(vec![Integer], vec![]);
        let next = frame(vec![Integer], vec![Object('a')]);
        assert_eq!(
            next.stack_map_frame(70, &previous),
            StackMapFrame::SameLocalsOneStack {
                offset_delta: 70,
                stack: Object('a'),
            }
        );
    }

    #[test]
    fn chop_and_same() {
        let previous = frame(vec![Integer, Long, Double, Object('b')], vec![]);
        let chopped = frame(vec![Integer], vec![]);
        assert_eq!(
            chopped.stack_map_frame(0, &previous),
            StackMapFrame::ChopLocalsNoStack {
                offset_delta: 0,
                chopped_k: 3,
            }
        );
        assert_eq!(
            previous.stack_map_frame(9, &previous),
            StackMapFrame::SameLocalsNoStack { offset_delta: 9 }
        );
    }

    #[test]
    fn full_when_prefix_differs() {
        let previous = frame(vec![Integer, Integer], vec![]);
        let next = frame(vec![Float, Integer, Integer], vec![]);
        assert!(matches!(
            next.stack_map_frame(0, &previous),
            StackMapFrame::Full { .. }
        ));

        let too_many = frame(vec![Integer; 6], vec![]);
        assert!(
            matches!(too_many.stack_map_frame(0, &previous), StackMapFrame::Full { .. }),
            "appending 4 locals needs a full frame"
        );

        let two_stack = frame(vec![Integer, Integer], vec![Integer, Integer]);
        assert!(matches!(
            two_stack.stack_map_frame(0, &previous),
            StackMapFrame::Full { .. }
        ));
    }

    #[test]
    fn table_round_trip() {
        let initial = frame(vec![Object('t')], vec![]);
        let frames = vec![
            (4, frame(vec![Object('t'), Integer], vec![])),
            (10, frame(vec![Object('t'), Integer], vec![Long])),
            (11, frame(vec![Object('t')], vec![])),
            (200, frame(vec![Object('t')], vec![])),
            (201, frame(vec![Float], vec![Integer, Integer])),
        ];
        let encoded = encode_stack_map_table(&initial, &frames).unwrap();
        let kinds: Vec<&str> = encoded
            .iter()
            .map(|frame| match frame {
                StackMapFrame::SameLocalsNoStack { .. } => "same",
                StackMapFrame::SameLocalsOneStack { .. } => "same1",
                StackMapFrame::ChopLocalsNoStack { .. } => "chop",
                StackMapFrame::AppendLocalsNoStack { .. } => "append",
                StackMapFrame::Full { .. } => "full",
            })
            .collect();
        assert_eq!(kinds, vec!["append", "same1", "chop", "same", "full"]);
        assert_eq!(encoded[3].offset_delta(), 188);

        let decoded = decode_stack_map_table(&initial, &encoded).unwrap();
        assert_eq!(decoded, frames);
    }

    #[test]
    fn offsets_must_increase() {
        let initial = TestFrame::default();
        let frames = vec![(4, TestFrame::default()), (4, TestFrame::default())];
        assert!(matches!(
            encode_stack_map_table(&initial, &frames),
            Err(Error::FrameOffsetsNotIncreasing {
                previous: 4,
                offset: 4
            })
        ));
    }

    #[test]
    fn chop_past_start() {
        let initial = frame(vec![Integer], vec![]);
        let chop = StackMapFrame::ChopLocalsNoStack {
            offset_delta: 0,
            chopped_k: 2,
        };
        assert!(chop.apply(&initial).is_err());
    }

    #[test]
    fn serialized_frame_kinds() {
        let mut pool = ConstantPool::new();
        let frames: Vec<StackMapFrame<ClassIndex, u16>> = vec![
            StackMapFrame::SameLocalsNoStack { offset_delta: 5 },
            StackMapFrame::SameLocalsNoStack { offset_delta: 500 },
            StackMapFrame::SameLocalsOneStack {
                offset_delta: 1,
                stack: VerificationType::Integer,
            },
            StackMapFrame::SameLocalsOneStack {
                offset_delta: 64,
                stack: VerificationType::Null,
            },
            StackMapFrame::ChopLocalsNoStack {
                offset_delta: 2,
                chopped_k: 1,
            },
            StackMapFrame::AppendLocalsNoStack {
                offset_delta: 3,
                locals: vec![VerificationType::Long, VerificationType::Float],
            },
            StackMapFrame::Full {
                offset_delta: 7,
                locals: vec![VerificationType::Top],
                stack: vec![VerificationType::Uninitialized(3)],
            },
        ];

        let mut writer = BufWriter::with_pool(&mut pool);
        frames.serialize(&mut writer).unwrap();
        let bytes = writer.into_bytes();
        assert_eq!(
            bytes,
            vec![
                0, 7, // count
                5, // same
                251, 0x01, 0xf4, // same extended
                65, 1, // same locals one stack
                247, 0, 64, 5, // extended
                250, 0, 2, // chop 1
                253, 0, 3, 4, 2, // append 2
                255, 0, 7, 0, 1, 0, 0, 1, 8, 0, 3, // full
            ]
        );

        let read_back = StackMapFrame::read_table(&bytes, &pool).unwrap();
        assert_eq!(read_back, frames);
    }

    #[test]
    fn reserved_tags_rejected() {
        let pool = ConstantPool::new();
        assert!(matches!(
            StackMapFrame::read_table(&[0, 1, 130], &pool),
            Err(Error::MalformedClass(_))
        ));
    }
}
