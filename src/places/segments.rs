/// How a user-facing segment is searched for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SearchTarget {
    /// A Places type name (`type=` parameter).
    Type(String),
    /// Free-text keyword (`keyword=` parameter).
    Keyword(String),
}

const SEGMENT_TYPES: &[(&str, &str)] = &[
    ("médicos", "doctor"),
    ("escritórios de contabilidade", "accounting"),
    ("clínicas", "clinic"),
    ("pet shops", "pet_store"),
    ("restaurantes", "restaurant"),
    ("academias", "gym"),
    ("escritórios de advocacia", "lawyer"),
    ("auto escola", "school"),
    ("auto escolas", "school"),
    ("escolas de direção", "school"),
];

pub fn resolve_segment(segment: &str) -> SearchTarget {
    let segment = segment.trim();
    let lowered = segment.to_lowercase();

    if let Some((_, place_type)) = SEGMENT_TYPES.iter().find(|(name, _)| *name == lowered) {
        return SearchTarget::Type((*place_type).to_string());
    }
    if let Some((_, place_type)) = SEGMENT_TYPES.iter().find(|(_, t)| *t == lowered) {
        return SearchTarget::Type((*place_type).to_string());
    }
    SearchTarget::Keyword(segment.to_string())
}
