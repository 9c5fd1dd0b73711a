use std::collections::BTreeMap;

use serde::{Deserialize, Deserializer, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Episode {
    #[serde(deserialize_with = "id_string")]
    pub id: String,
    #[serde(default, deserialize_with = "nullable_string")]
    pub title: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub foreign_title: Option<String>,
    /// Manifest URL of the episode, empty when the service has none yet
    #[serde(default, deserialize_with = "nullable_string")]
    pub file: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Program {
    #[serde(deserialize_with = "id_string")]
    pub id: String,
    #[serde(default, deserialize_with = "nullable_string")]
    pub title: String,
    #[serde(default)]
    pub foreign_title: Option<String>,
    #[serde(default)]
    pub short_description: Option<String>,
    #[serde(default, deserialize_with = "nullable_vec")]
    pub episodes: Vec<Episode>,
}

/// Programs keyed by identifier.
///
/// Serialized as a plain JSON object `{ "<id>": Program, .. }`, which is the
/// on-disk shape of `programs.json`. Iteration follows identifier order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Catalog {
    programs: BTreeMap<String, Program>,
}

impl Catalog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, id: &str) -> Option<&Program> {
        self.programs.get(id)
    }

    pub fn contains(&self, id: &str) -> bool {
        self.programs.contains_key(id)
    }

    pub fn len(&self) -> usize {
        self.programs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.programs.is_empty()
    }

    pub fn programs(&self) -> impl Iterator<Item = &Program> {
        self.programs.values()
    }

    pub fn episode_count(&self) -> usize {
        self.programs.values().map(|p| p.episodes.len()).sum()
    }

    pub(crate) fn get_mut(&mut self, id: &str) -> Option<&mut Program> {
        self.programs.get_mut(id)
    }
}

/// Later programs replace earlier ones with the same identifier.
impl FromIterator<Program> for Catalog {
    fn from_iter<I: IntoIterator<Item = Program>>(iter: I) -> Self {
        Self {
            programs: iter.into_iter().map(|p| (p.id.clone(), p)).collect(),
        }
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum RawId {
    Text(String),
    Number(i64),
}

/// The catalog service hands out numeric program ids and string episode ids;
/// both are kept as strings. A null id becomes empty so the record can be
/// dropped later instead of failing the whole response.
fn id_string<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match Option::<RawId>::deserialize(deserializer)? {
        Some(RawId::Text(s)) => s,
        Some(RawId::Number(n)) => n.to_string(),
        None => String::new(),
    })
}

fn nullable_string<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<String>::deserialize(deserializer)?.unwrap_or_default())
}

fn nullable_vec<'de, D, T>(deserializer: D) -> Result<Vec<T>, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de>,
{
    Ok(Option::<Vec<T>>::deserialize(deserializer)?.unwrap_or_default())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn program_accepts_numeric_ids_and_nulls() {
        let program: Program = serde_json::from_str(
            r#"{
                "id": 31685,
                "title": "Fréttir",
                "foreign_title": null,
                "episodes": [
                    {"id": "ab1x", "title": null, "file": "https://example.com/ab1x.m3u8"},
                    {"id": 7, "title": "Seinni", "file": null}
                ]
            }"#,
        )
        .unwrap();

        assert_eq!(program.id, "31685");
        assert_eq!(program.foreign_title, None);
        assert_eq!(program.short_description, None);
        assert_eq!(program.episodes[0].title, "");
        assert_eq!(program.episodes[1].id, "7");
        assert_eq!(program.episodes[1].file, "");
    }

    #[test]
    fn null_ids_deserialize_as_empty() {
        let programs: Vec<Program> = serde_json::from_str(
            r#"[
                {"id": 1, "title": "Kastljós", "episodes": [{"id": null, "title": "?"}]},
                {"id": null, "title": "Nafnlaust"}
            ]"#,
        )
        .unwrap();

        assert_eq!(programs.len(), 2);
        assert_eq!(programs[0].episodes[0].id, "");
        assert_eq!(programs[1].id, "");
    }

    #[test]
    fn catalog_serializes_as_object_keyed_by_id() {
        let catalog: Catalog = [Program {
            id: "p1".into(),
            title: "Krakkafréttir".into(),
            foreign_title: None,
            short_description: Some("Fréttir fyrir krakka".into()),
            episodes: vec![Episode {
                id: "e1".into(),
                title: "Þáttur 1".into(),
                foreign_title: None,
                file: "https://example.com/e1.m3u8".into(),
            }],
        }]
        .into_iter()
        .collect();

        let value = serde_json::to_value(&catalog).unwrap();
        assert_eq!(value["p1"]["title"], "Krakkafréttir");
        assert_eq!(value["p1"]["episodes"][0]["file"], "https://example.com/e1.m3u8");
        assert!(value["p1"]["episodes"][0].get("foreign_title").is_none());

        let back: Catalog = serde_json::from_value(value).unwrap();
        assert_eq!(back, catalog);
    }

    #[test]
    fn later_program_with_same_id_wins() {
        let make = |title: &str| Program {
            id: "p1".into(),
            title: title.into(),
            foreign_title: None,
            short_description: None,
            episodes: Vec::new(),
        };
        let catalog: Catalog = [make("first"), make("second")].into_iter().collect();

        assert_eq!(catalog.len(), 1);
        assert_eq!(catalog.get("p1").unwrap().title, "second");
    }
}
