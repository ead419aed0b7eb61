//! Fixed query vocabulary: the topic catalog used for the mixed feed and the
//! coarse field filters offered next to the search box.

/// Canonical research topics sampled when no query is active.
pub const TOPIC_CATALOG: &[&str] = &[
    "machine learning",
    "quantum computing",
    "climate change",
    "neuroscience",
    "gene editing",
    "renewable energy",
    "astrophysics",
    "materials science",
    "cryptography",
    "epidemiology",
    "robotics",
    "ocean ecology",
    "number theory",
    "behavioral economics",
    "natural language processing",
    "immunology",
];

/// Field keyword to the search phrase sent to the providers.
pub const FIELD_QUERIES: &[(&str, &str)] = &[
    ("physics", "quantum physics theoretical physics"),
    ("computer science", "machine learning artificial intelligence"),
    ("biology", "molecular biology genetics"),
    ("chemistry", "organic chemistry chemical synthesis"),
    ("mathematics", "pure mathematics applied mathematics"),
    ("medicine", "clinical medicine medical research"),
    ("psychology", "cognitive psychology behavior"),
    ("economics", "economics finance markets"),
    ("engineering", "mechanical electrical engineering"),
    ("environment", "environmental science climate"),
    ("astronomy", "astronomy astrophysics cosmology"),
    ("neuroscience", "neuroscience brain research"),
];

/// Map a field keyword to its canned phrase. Matching ignores ASCII case and
/// surrounding whitespace; unknown fields are searched as typed.
pub fn field_query(field: &str) -> &str {
    let key = field.trim();
    FIELD_QUERIES
        .iter()
        .find(|(name, _)| name.eq_ignore_ascii_case(key))
        .map(|(_, phrase)| *phrase)
        .unwrap_or(key)
}

pub fn field_names() -> Vec<&'static str> {
    FIELD_QUERIES.iter().map(|(name, _)| *name).collect()
}
