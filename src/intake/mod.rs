pub mod patient;
pub mod photos;
pub mod sheet;

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum BodyArea {
    Head,
    Neck,
    Chest,
    LeftArm,
    RightArm,
    Abdomen,
    LeftLeg,
    RightLeg,
}

const HEAD: &[&str] = &[
    "Headache",
    "Dizziness",
    "Nausea",
    "Eye pain",
    "Ear pain",
    "Sinus pressure",
    "Migraine",
    "Jaw pain",
    "Tooth pain",
    "Neck stiffness",
];
const NECK: &[&str] = &[
    "Neck pain",
    "Stiffness",
    "Muscle spasm",
    "Swollen glands",
    "Difficulty swallowing",
    "Throat pain",
];
const CHEST: &[&str] = &[
    "Chest pain",
    "Shortness of breath",
    "Cough",
    "Heart palpitations",
    "Wheezing",
    "Tight chest",
    "Burning sensation",
];
const ARM: &[&str] = &[
    "Arm pain",
    "Numbness",
    "Tingling",
    "Weakness",
    "Swelling",
    "Limited mobility",
    "Joint pain",
];
const ABDOMEN: &[&str] = &[
    "Stomach pain",
    "Nausea",
    "Vomiting",
    "Bloating",
    "Cramps",
    "Diarrhea",
    "Constipation",
    "Loss of appetite",
];
const LEG: &[&str] = &[
    "Leg pain",
    "Numbness",
    "Tingling",
    "Swelling",
    "Cramps",
    "Weakness",
    "Joint pain",
    "Difficulty walking",
];

impl BodyArea {
    pub const ALL: [BodyArea; 8] = [
        BodyArea::Head,
        BodyArea::Neck,
        BodyArea::Chest,
        BodyArea::LeftArm,
        BodyArea::RightArm,
        BodyArea::Abdomen,
        BodyArea::LeftLeg,
        BodyArea::RightLeg,
    ];

    /// Wire identifier, e.g. `left-arm`.
    pub fn as_str(self) -> &'static str {
        match self {
            BodyArea::Head => "head",
            BodyArea::Neck => "neck",
            BodyArea::Chest => "chest",
            BodyArea::LeftArm => "left-arm",
            BodyArea::RightArm => "right-arm",
            BodyArea::Abdomen => "abdomen",
            BodyArea::LeftLeg => "left-leg",
            BodyArea::RightLeg => "right-leg",
        }
    }

    /// Human form used in prompts, e.g. `left arm`.
    pub fn display_name(self) -> String {
        self.as_str().replace('-', " ")
    }

    /// Symptoms offered for this area, in presentation order.
    pub fn symptoms(self) -> &'static [&'static str] {
        match self {
            BodyArea::Head => HEAD,
            BodyArea::Neck => NECK,
            BodyArea::Chest => CHEST,
            BodyArea::LeftArm | BodyArea::RightArm => ARM,
            BodyArea::Abdomen => ABDOMEN,
            BodyArea::LeftLeg | BodyArea::RightLeg => LEG,
        }
    }

    pub fn offers(self, symptom: &str) -> bool {
        self.symptoms().contains(&symptom)
    }
}

impl fmt::Display for BodyArea {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for BodyArea {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.trim().to_ascii_lowercase().replace(' ', "-");
        BodyArea::ALL
            .into_iter()
            .find(|area| area.as_str() == normalized)
            .ok_or_else(|| format!("Unknown body area: {}", s))
    }
}
