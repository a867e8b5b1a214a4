use crate::domain::models::SubjectCatalogEntry;
use std::collections::BTreeSet;

pub const DEFAULT_ICON_URL: &str = "https://cdn-icons-png.flaticon.com/512/2103/2103637.png";

const CANONICAL_SUBJECTS: [(&str, &str); 10] = [
    ("Mathematics", "https://cdn-icons-png.flaticon.com/512/2103/2103633.png"),
    ("Physics", "https://cdn-icons-png.flaticon.com/512/2103/2103662.png"),
    ("Chemistry", "https://cdn-icons-png.flaticon.com/512/2103/2103651.png"),
    ("Biology", "https://cdn-icons-png.flaticon.com/512/2103/2103632.png"),
    ("History", "https://cdn-icons-png.flaticon.com/512/2103/2103683.png"),
    ("Geography", "https://cdn-icons-png.flaticon.com/512/2103/2103659.png"),
    (
        "English Literature",
        "https://cdn-icons-png.flaticon.com/512/2103/2103663.png",
    ),
    (
        "Computer Science",
        "https://cdn-icons-png.flaticon.com/512/2103/2103645.png",
    ),
    ("Economics", "https://cdn-icons-png.flaticon.com/512/2103/2103654.png"),
    ("Art", "https://cdn-icons-png.flaticon.com/512/2103/2103642.png"),
];

pub fn icon_for(subject: &str) -> &'static str {
    CANONICAL_SUBJECTS
        .iter()
        .find(|(name, _)| *name == subject)
        .or_else(|| {
            CANONICAL_SUBJECTS
                .iter()
                .find(|(name, _)| name.eq_ignore_ascii_case(subject))
        })
        .map(|(_, icon)| *icon)
        .unwrap_or(DEFAULT_ICON_URL)
}

pub fn canonical_subject(name: &str) -> Option<&'static str> {
    CANONICAL_SUBJECTS
        .iter()
        .map(|(canonical, _)| *canonical)
        .find(|canonical| canonical.eq_ignore_ascii_case(name))
}

/// The primary name wins when it is non-blank. The alternate field is often a person's
/// name, so it is only accepted when it names a canonical subject.
pub fn resolve_subject_name(primary: Option<&str>, alternate: Option<&str>) -> Option<String> {
    if let Some(primary) = primary.filter(|value| !value.trim().is_empty()) {
        return Some(primary.to_string());
    }
    alternate
        .filter(|value| !value.trim().is_empty())
        .filter(|value| canonical_subject(value).is_some())
        .map(ToOwned::to_owned)
}

pub fn build_catalog<I>(names: I) -> Vec<SubjectCatalogEntry>
where
    I: IntoIterator<Item = String>,
{
    names
        .into_iter()
        .collect::<BTreeSet<_>>()
        .into_iter()
        .enumerate()
        .map(|(index, name)| SubjectCatalogEntry {
            id: (index + 1).to_string(),
            icon_url: icon_for(&name).to_string(),
            name,
        })
        .collect()
}
