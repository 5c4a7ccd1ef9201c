//! Skeleton segments per body part
//!
//! Indices follow the 33-point pose landmark topology. Each body part owns
//! the connections the overlay draws when that part is enabled.

use serde::{Deserialize, Serialize};

use crate::BodyPart;

/// Number of landmarks in a full pose
pub const POSE_LANDMARK_COUNT: usize = 33;

/// A connection between two landmarks
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Segment {
    pub start: u8,
    pub end: u8,
}

const fn seg(start: u8, end: u8) -> Segment {
    Segment { start, end }
}

const FACE: &[Segment] = &[
    seg(0, 1),
    seg(1, 2),
    seg(2, 3),
    seg(3, 7),
    seg(0, 4),
    seg(4, 5),
    seg(5, 6),
    seg(6, 8),
    seg(9, 10),
];
const TORSO: &[Segment] = &[seg(11, 12), seg(23, 24), seg(11, 23), seg(12, 24)];
const LEFT_ARM: &[Segment] = &[seg(11, 13), seg(13, 15)];
const RIGHT_ARM: &[Segment] = &[seg(12, 14), seg(14, 16)];
const LEFT_WRIST: &[Segment] = &[seg(15, 21), seg(15, 17), seg(15, 19), seg(17, 19)];
const RIGHT_WRIST: &[Segment] = &[seg(16, 22), seg(16, 20), seg(16, 18), seg(18, 20)];
const LEFT_LEG: &[Segment] = &[seg(23, 25), seg(25, 27)];
const RIGHT_LEG: &[Segment] = &[seg(24, 26), seg(26, 28)];
const LEFT_ANKLE: &[Segment] = &[seg(27, 29), seg(27, 31), seg(29, 31)];
const RIGHT_ANKLE: &[Segment] = &[seg(28, 30), seg(28, 32), seg(30, 32)];

impl BodyPart {
    /// Connections drawn for this body part
    pub fn segments(self) -> &'static [Segment] {
        match self {
            BodyPart::Face => FACE,
            BodyPart::Torso => TORSO,
            BodyPart::LeftArm => LEFT_ARM,
            BodyPart::RightArm => RIGHT_ARM,
            BodyPart::LeftWrist => LEFT_WRIST,
            BodyPart::RightWrist => RIGHT_WRIST,
            BodyPart::LeftLeg => LEFT_LEG,
            BodyPart::RightLeg => RIGHT_LEG,
            BodyPart::LeftAnkle => LEFT_ANKLE,
            BodyPart::RightAnkle => RIGHT_ANKLE,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::SharedConfiguration;

    #[test]
    fn test_segments_stay_in_topology() {
        for part in BodyPart::all() {
            for s in part.segments() {
                assert!((s.start as usize) < POSE_LANDMARK_COUNT);
                assert!((s.end as usize) < POSE_LANDMARK_COUNT);
            }
        }
    }

    #[test]
    fn test_no_segment_owned_twice() {
        let mut all: Vec<Segment> = BodyPart::all()
            .iter()
            .flat_map(|p| p.segments().iter().copied())
            .collect();
        let total = all.len();
        all.sort_by_key(|s| (s.start, s.end));
        all.dedup();
        assert_eq!(all.len(), total);
    }

    #[test]
    fn test_enabled_segments_follow_toggles() {
        let config = SharedConfiguration::new();
        assert!(config.enabled_segments().is_empty());

        config.set_body_part(BodyPart::LeftArm, true);
        assert_eq!(config.enabled_segments(), LEFT_ARM.to_vec());

        config.set_body_part(BodyPart::Torso, true);
        assert_eq!(config.enabled_segments().len(), TORSO.len() + LEFT_ARM.len());
    }
}
