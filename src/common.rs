use serde::{Deserialize, Serialize};

/// Number of rows per window.
pub const WINDOW_SIZE: usize = 30;
/// Step between window start indices (equal to the window size: no overlap).
pub const WINDOW_STRIDE: usize = 30;
/// Accelerometer channels per row (x, y, z).
pub const NUM_CHANNELS: usize = 3;
/// Fixed activity classes in the dataset.
pub const NUM_CLASSES: usize = 6;
/// Flattened model input: all channels of one window.
pub const INPUT_DIM: usize = WINDOW_SIZE * NUM_CHANNELS;

/// The six WISDM activities.
///
/// The integer code of each activity is its declaration order here, and the
/// one-hot index written by the merge stage equals that code, so the two
/// encodings agree everywhere in the pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ActivityLabel {
    Jogging,
    Walking,
    Downstairs,
    Upstairs,
    Sitting,
    Standing,
}

impl ActivityLabel {
    pub const ALL: [ActivityLabel; NUM_CLASSES] = [
        ActivityLabel::Jogging,
        ActivityLabel::Walking,
        ActivityLabel::Downstairs,
        ActivityLabel::Upstairs,
        ActivityLabel::Sitting,
        ActivityLabel::Standing,
    ];

    pub fn code(self) -> usize {
        self as usize
    }

    pub fn from_code(code: usize) -> Option<Self> {
        Self::ALL.get(code).copied()
    }

    /// Recognizes an activity section name from the raw text format.
    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "Jogging" => Some(ActivityLabel::Jogging),
            "Walking" => Some(ActivityLabel::Walking),
            "Downstairs" => Some(ActivityLabel::Downstairs),
            "Upstairs" => Some(ActivityLabel::Upstairs),
            "Sitting" => Some(ActivityLabel::Sitting),
            "Standing" => Some(ActivityLabel::Standing),
            _ => None,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            ActivityLabel::Jogging => "Jogging",
            ActivityLabel::Walking => "Walking",
            ActivityLabel::Downstairs => "Downstairs",
            ActivityLabel::Upstairs => "Upstairs",
            ActivityLabel::Sitting => "Sitting",
            ActivityLabel::Standing => "Standing",
        }
    }

    pub fn one_hot(self) -> [f32; NUM_CLASSES] {
        let mut v = [0.0; NUM_CLASSES];
        v[self.code()] = 1.0;
        v
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn codes_follow_declaration_order() {
        assert_eq!(ActivityLabel::Jogging.code(), 0);
        assert_eq!(ActivityLabel::Walking.code(), 1);
        assert_eq!(ActivityLabel::Downstairs.code(), 2);
        assert_eq!(ActivityLabel::Upstairs.code(), 3);
        assert_eq!(ActivityLabel::Sitting.code(), 4);
        assert_eq!(ActivityLabel::Standing.code(), 5);
    }

    #[test]
    fn one_hot_index_equals_code() {
        for label in ActivityLabel::ALL {
            let v = label.one_hot();
            assert_eq!(v.iter().filter(|&&c| c == 1.0).count(), 1);
            assert_eq!(v.iter().filter(|&&c| c == 0.0).count(), NUM_CLASSES - 1);
            assert_eq!(v[label.code()], 1.0);
        }
    }

    #[test]
    fn name_round_trip() {
        for label in ActivityLabel::ALL {
            assert_eq!(ActivityLabel::from_name(label.name()), Some(label));
        }
        assert_eq!(ActivityLabel::from_name("Flying"), None);
    }
}
