//! Built-in catalog of sample topics.

use serde::Serialize;

use crate::{Level, Subject, VideoRequest};

/// A sample topic users can start from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ExampleTopic {
    pub key: &'static str,
    pub topic: &'static str,
    pub subject: Subject,
    pub level: Level,
    /// Main objects shown in the scene
    pub objects: &'static [&'static str],
    pub description: &'static str,
}

impl ExampleTopic {
    /// Request for this example on behalf of `user_id`, with default settings.
    pub fn to_request(&self, user_id: impl Into<String>) -> VideoRequest {
        VideoRequest::new(self.topic, self.subject, self.level, user_id)
    }
}

/// Keys of all examples for one subject.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SubjectTopics {
    pub subject: Subject,
    pub topics: Vec<&'static str>,
}

static EXAMPLES: &[ExampleTopic] = &[
    ExampleTopic {
        key: "gravity_and_planetary_motion",
        topic: "Gravity and Planetary Motion",
        subject: Subject::Physics,
        level: Level::HighSchool,
        objects: &["Sun", "Earth", "Moon"],
        description: "Earth orbiting the Sun with the Moon orbiting Earth",
    },
    ExampleTopic {
        key: "electromagnetic_fields",
        topic: "Electromagnetic Fields",
        subject: Subject::Physics,
        level: Level::College,
        objects: &["Positive charge", "Negative charge", "Field lines"],
        description: "Field lines between a positive and a negative charge",
    },
    ExampleTopic {
        key: "water_molecule",
        topic: "Water Molecule Structure",
        subject: Subject::Chemistry,
        level: Level::HighSchool,
        objects: &["Oxygen", "Hydrogen", "Hydrogen", "Covalent bonds"],
        description: "Bent H2O geometry with bond angle and partial charges",
    },
    ExampleTopic {
        key: "dna_structure",
        topic: "DNA Double Helix Structure",
        subject: Subject::Chemistry,
        level: Level::College,
        objects: &["Sugar-phosphate backbone", "Base pairs"],
        description: "Rotating double helix with paired nucleotide bases",
    },
    ExampleTopic {
        key: "cell_division",
        topic: "Mitosis - Cell Division Process",
        subject: Subject::Biology,
        level: Level::HighSchool,
        objects: &["Cell membrane", "Nucleus", "Chromosomes", "Spindle fibers"],
        description: "Prophase through telophase of a dividing cell",
    },
    ExampleTopic {
        key: "photosynthesis",
        topic: "Photosynthesis Process",
        subject: Subject::Biology,
        level: Level::MiddleSchool,
        objects: &["Leaf", "Chloroplast", "Sunlight", "CO2", "O2"],
        description: "Sunlight, water and carbon dioxide turned into glucose and oxygen",
    },
    ExampleTopic {
        key: "calculus_derivatives",
        topic: "Calculus - Understanding Derivatives",
        subject: Subject::Mathematics,
        level: Level::College,
        objects: &["Function curve", "Tangent line", "Secant line"],
        description: "Secant line converging to the tangent of a curve",
    },
    ExampleTopic {
        key: "geometric_proofs",
        topic: "Pythagorean Theorem Proof",
        subject: Subject::Mathematics,
        level: Level::HighSchool,
        objects: &["Right triangle", "Square a", "Square b", "Square c"],
        description: "Squares on the sides of a right triangle rearranged",
    },
    ExampleTopic {
        key: "ancient_rome",
        topic: "Ancient Roman Architecture",
        subject: Subject::History,
        level: Level::HighSchool,
        objects: &["Colosseum", "Arches", "Columns"],
        description: "Fly-through of the Colosseum and its arches",
    },
];

/// All examples for `subject`, in catalog order. Empty for subjects without samples.
pub fn examples_for_subject(subject: Subject) -> Vec<&'static ExampleTopic> {
    EXAMPLES.iter().filter(|e| e.subject == subject).collect()
}

/// A single example by subject and key.
pub fn example(subject: Subject, key: &str) -> Option<&'static ExampleTopic> {
    EXAMPLES
        .iter()
        .find(|e| e.subject == subject && e.key == key)
}

/// Keys grouped by subject. Subjects appear in enumeration order; those without examples are omitted.
pub fn list_all_topics() -> Vec<SubjectTopics> {
    Subject::ALL
        .iter()
        .filter_map(|&subject| {
            let topics: Vec<&'static str> = examples_for_subject(subject)
                .into_iter()
                .map(|e| e.key)
                .collect();
            (!topics.is_empty()).then_some(SubjectTopics { subject, topics })
        })
        .collect()
}
