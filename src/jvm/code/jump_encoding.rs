//! Fix oversized jumps by rewriting them into `goto_w`/`jsr_w`
//!
//! Branches are first encoded with 16-bit relative offsets. Once every label is bound, some of
//! those offsets may not fit. This module works out which jumps need to be widened and rewrites
//! the code array accordingly.
//!
//! ### Termination
//!
//! Widening a jump makes the code longer, which can push other jumps over the limit, so this is a
//! worklist algorithm. It finishes because the set of jumps still using 16-bit offsets only ever
//! shrinks:
//!
//!   - once a jump is widened, it is discarded from consideration (32 bits is definitely enough)
//!
//!   - the extra 16-bit jumps introduced by rewrites always jump small _fixed_ distances, so they
//!     never need to be rewritten
//!
//! Every time a jump is widened, exactly the jumps whose span crosses it get longer (by the growth
//! of the widened jump), so the final set is a fixed point: no jump left with a 16-bit offset
//! can be out of range.
//!
//! ### Rewriting
//!
//! Rewrites must always insert a multiple of four bytes, so that any `lookupswitch`/`tableswitch`
//! padding is still correct. For `goto` (and `jsr`), this requires some `nop` padding:
//!
//! ```text,ignore,no_run
//!                           nop
//!                           nop
//!     goto L2               goto_w L2
//! L1: ...         =>    L1: ...
//!     ...                   ...
//! L2: ...               L2: ...
//! ```
//!
//! For conditional branches, the rewrite happens to already introduce exactly 8 bytes.
//!
//! ```text,ignore,no_run
//!                           if* L3
//!                           goto L1
//!     if* L2            L3: goto_w L2
//! L1: ...         =>    L1: ...
//!     ...                   ...
//! L2: ...               L2: ...
//! ```

use super::Opcode;
use crate::util::{Interval, SegmentTree};
use std::cell::Cell;
use std::collections::HashSet;
use std::ops::{RangeBounds, RangeInclusive};

/// Range of relative jump offsets supported by `goto` and `if*` branch instructions
pub const SIGNED_16BIT_JUMP_RANGE: RangeInclusive<isize> =
    RangeInclusive::new(i16::MIN as isize, i16::MAX as isize);

/// Branch instruction encoded with a 16-bit offset
#[derive(Copy, Clone, PartialEq, Eq, Debug)]
pub struct ShortJump {
    /// Offset of the branch instruction
    pub position: u32,

    /// Offset being jumped to
    pub target: u32,

    /// Is this a `goto` or `jsr` (vs. a conditional branch)?
    pub is_goto: bool,
}

impl ShortJump {
    /// Bytes added to the code when this jump is widened
    pub fn growth(&self) -> u32 {
        if self.is_goto {
            4
        } else {
            8
        }
    }

    /// Offset of the 32-bit branch in the rewritten jump, relative to the start of the rewrite
    pub fn wide_branch_offset(&self) -> u32 {
        if self.is_goto {
            2
        } else {
            6
        }
    }
}

/// Given short jumps (sorted by position), find every jump that needs to be widened
///
/// The `small_jump_range` parameter should always be `SIGNED_16BIT_JUMP_RANGE` - it is a
/// parameter only for unit testing purposes. Returned indices are sorted.
pub fn widen_oversized_jumps(
    jumps: &[ShortJump],
    small_jump_range: &impl RangeBounds<isize>,
) -> Vec<usize> {
    let intervals: Vec<JumpInterval> = jumps
        .iter()
        .enumerate()
        .map(|(index, jump)| JumpInterval::new(index, jump))
        .collect();

    // Compute the starter set of oversized jumps (if there are none, bail out now)
    let mut oversized_jumps: Vec<&JumpInterval> = intervals
        .iter()
        .filter(|jump| jump.is_oversized(small_jump_range))
        .collect();
    if oversized_jumps.is_empty() {
        return vec![];
    }
    let mut known_oversized_jumps: HashSet<usize> =
        oversized_jumps.iter().map(|jump| jump.index).collect();

    // Construct a segment tree using all of the jumps
    let jump_tree = SegmentTree::new(intervals.iter().collect());
    let mut rounds = 0;
    while let Some(oversized_jump) = oversized_jumps.pop() {
        rounds += 1;
        let widened = &jumps[oversized_jump.index];

        // Update the new jump distances of intervals crossing
        for interval in jump_tree.intervals_containing(&widened.position) {
            if known_oversized_jumps.contains(&interval.index) {
                continue;
            }

            // If the new interval length is too big, add it back to the set of oversized jumps
            if interval.lengthen_jump(widened.growth() as isize, small_jump_range) {
                known_oversized_jumps.insert(interval.index);
                oversized_jumps.push(interval);
            }
        }
    }

    log::debug!(
        "Widening {} of {} short jumps ({} rounds)",
        known_oversized_jumps.len(),
        jumps.len(),
        rounds
    );
    let mut widened: Vec<usize> = known_oversized_jumps.into_iter().collect();
    widened.sort_unstable();
    widened
}

/// Rewrite the code array, expanding each widened jump
///
/// The 32-bit branch offsets are left as zeros, for the caller to patch once label offsets are
/// relocated.
pub fn widen_code(code: &[u8], jumps: &[ShortJump], widened: &[usize]) -> Vec<u8> {
    let extra: u32 = widened.iter().map(|idx| jumps[*idx].growth()).sum();
    let mut output = Vec::with_capacity(code.len() + extra as usize);

    let mut copied_until = 0;
    for jump in widened.iter().map(|idx| &jumps[*idx]) {
        let position = jump.position as usize;
        output.extend_from_slice(&code[copied_until..position]);
        let opcode = code[position];

        if opcode == Opcode::GOTO.byte() || opcode == Opcode::JSR.byte() {
            let wide = if opcode == Opcode::GOTO.byte() {
                Opcode::GOTO_W
            } else {
                Opcode::JSR_W
            };
            output.extend_from_slice(&[Opcode::NOP.byte(), Opcode::NOP.byte()]);
            output.extend_from_slice(&[wide.byte(), 0, 0, 0, 0]);
        } else {
            output.extend_from_slice(&[opcode, 0, 6]);
            output.extend_from_slice(&[Opcode::GOTO.byte(), 0, 8]);
            output.extend_from_slice(&[Opcode::GOTO_W.byte(), 0, 0, 0, 0]);
        }
        copied_until = position + 3;
    }
    output.extend_from_slice(&code[copied_until..]);
    output
}

/// Mapping from offsets before widening to offsets after widening
#[derive(Debug, Default)]
pub struct Relocation {
    /// Positions of widened jumps, along with the total growth up to and including that jump
    points: Vec<(u32, u32)>,
}

impl Relocation {
    pub fn new(jumps: &[ShortJump], widened: &[usize]) -> Relocation {
        let mut total = 0;
        let mut points: Vec<(u32, u32)> = widened
            .iter()
            .map(|idx| {
                total += jumps[*idx].growth();
                (jumps[*idx].position, total)
            })
            .collect();
        points.sort_unstable();
        Relocation { points }
    }

    pub fn is_identity(&self) -> bool {
        self.points.is_empty()
    }

    /// New offset for an old offset
    ///
    /// An offset at the start of a widened jump stays at the start of its rewrite.
    pub fn relocate(&self, offset: u32) -> u32 {
        let before = self.points.partition_point(|(position, _)| *position < offset);
        match before {
            0 => offset,
            n => offset + self.points[n - 1].1,
        }
    }
}

#[derive(Debug)]
struct JumpInterval {
    /// Index of the jump
    index: usize,

    /// Offsets which stretch the jump if code is inserted there
    ///
    /// This always has the start of the jump as an endpoint, so that the start of the jump can
    /// be queried in the segment tree.
    jump_range: RangeInclusive<u32>,

    /// Distance being jumped
    jump_distance: Cell<isize>,
}

impl JumpInterval {
    fn new(index: usize, jump: &ShortJump) -> JumpInterval {
        let jump_range = if jump.position < jump.target {
            jump.position..=jump.target - 1
        } else {
            jump.target..=jump.position
        };
        JumpInterval {
            index,
            jump_range,
            jump_distance: Cell::new(jump.target as isize - jump.position as isize),
        }
    }

    /// Is this jump too big to fit in a 16-bit signed offset
    fn is_oversized(&self, small_jump_range: &impl RangeBounds<isize>) -> bool {
        !small_jump_range.contains(&self.jump_distance.get())
    }

    /// Increase the jump distance and return whether the new distance is oversized
    fn lengthen_jump(&self, by: isize, small_jump_range: &impl RangeBounds<isize>) -> bool {
        let old_dist = self.jump_distance.get();
        let new_dist = if old_dist <= 0 {
            old_dist - by
        } else {
            old_dist + by
        };
        self.jump_distance.set(new_dist);
        !small_jump_range.contains(&new_dist)
    }
}

impl Interval for JumpInterval {
    type Endpoint = u32;

    fn from(&self) -> u32 {
        *self.jump_range.start()
    }

    fn until(&self) -> u32 {
        *self.jump_range.end()
    }
}
