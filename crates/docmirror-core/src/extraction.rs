//! Entity extraction contract for graph indexing.
//!
//! The LLM is asked for strict JSON against a fixed taxonomy:
//!
//! ```json
//! {
//!   "entities":  [{"name": "Tokio", "type": "Technology", "description": "async runtime"}],
//!   "relations": [{"source": "Sync", "target": "Tokio", "type": "USES"}]
//! }
//! ```
//!
//! [`parse_extraction`] never fails. Malformed output degrades to an empty
//! [`Extraction`] and a warning, so one bad response cannot abort indexing.

use std::collections::HashSet;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::llm::strip_code_fence;

/// Entity taxonomy. Unknown types from the model map to [`EntityType::Concept`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EntityType {
    Concept,
    #[serde(rename = "API")]
    Api,
    Component,
    Technology,
}

impl EntityType {
    pub fn as_str(&self) -> &'static str {
        match self {
            EntityType::Concept => "Concept",
            EntityType::Api => "API",
            EntityType::Component => "Component",
            EntityType::Technology => "Technology",
        }
    }

    fn from_model(s: &str) -> Self {
        match s.trim().to_ascii_lowercase().as_str() {
            "api" => EntityType::Api,
            "component" => EntityType::Component,
            "technology" => EntityType::Technology,
            _ => EntityType::Concept,
        }
    }
}

impl fmt::Display for EntityType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Relation taxonomy. Unknown types map to [`RelationType::RelatedTo`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RelationType {
    RelatedTo,
    DependsOn,
    Uses,
    PartOf,
}

impl RelationType {
    pub fn as_str(&self) -> &'static str {
        match self {
            RelationType::RelatedTo => "RELATED_TO",
            RelationType::DependsOn => "DEPENDS_ON",
            RelationType::Uses => "USES",
            RelationType::PartOf => "PART_OF",
        }
    }

    fn from_model(s: &str) -> Self {
        match s.trim().to_ascii_uppercase().replace([' ', '-'], "_").as_str() {
            "DEPENDS_ON" => RelationType::DependsOn,
            "USES" => RelationType::Uses,
            "PART_OF" => RelationType::PartOf,
            _ => RelationType::RelatedTo,
        }
    }
}

impl fmt::Display for RelationType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Entity {
    pub name: String,
    pub entity_type: EntityType,
    pub description: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Relation {
    pub source: String,
    pub target: String,
    pub relation_type: RelationType,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Extraction {
    pub entities: Vec<Entity>,
    pub relations: Vec<Relation>,
}

impl Extraction {
    pub fn is_empty(&self) -> bool {
        self.entities.is_empty() && self.relations.is_empty()
    }
}

#[derive(Deserialize)]
struct RawExtraction {
    #[serde(default)]
    entities: Vec<RawEntity>,
    #[serde(default)]
    relations: Vec<RawRelation>,
}

#[derive(Deserialize)]
struct RawEntity {
    #[serde(default)]
    name: String,
    #[serde(default, rename = "type")]
    entity_type: String,
    #[serde(default)]
    description: String,
}

#[derive(Deserialize)]
struct RawRelation {
    #[serde(default)]
    source: String,
    #[serde(default)]
    target: String,
    #[serde(default, rename = "type")]
    relation_type: String,
}

/// Build the extraction prompt for one chunk.
pub fn extraction_prompt(chunk_text: &str) -> String {
    format!(
        "Extract the key entities and relations from the documentation excerpt below.\n\
         Entity types: Concept, API, Component, Technology.\n\
         Relation types: RELATED_TO, DEPENDS_ON, USES, PART_OF.\n\
         Respond with JSON only, no prose, in exactly this shape:\n\
         {{\"entities\": [{{\"name\": \"...\", \"type\": \"...\", \"description\": \"...\"}}], \
         \"relations\": [{{\"source\": \"...\", \"target\": \"...\", \"type\": \"...\"}}]}}\n\
         Relation endpoints must be entity names from the entities list.\n\n\
         Excerpt:\n{chunk_text}"
    )
}

/// Parse a model response into an [`Extraction`].
///
/// Entities with blank names are dropped and duplicates (by name) collapse
/// to the first occurrence. Relations survive only when both endpoints are
/// extracted entities.
pub fn parse_extraction(response: &str) -> Extraction {
    let raw: RawExtraction = match serde_json::from_str(strip_code_fence(response)) {
        Ok(raw) => raw,
        Err(e) => {
            tracing::warn!(error = %e, "entity extraction returned malformed JSON; using empty extraction");
            return Extraction::default();
        }
    };

    let mut seen = HashSet::new();
    let entities: Vec<Entity> = raw
        .entities
        .into_iter()
        .filter_map(|e| {
            let name = e.name.trim().to_string();
            if name.is_empty() || !seen.insert(name.clone()) {
                return None;
            }
            Some(Entity {
                name,
                entity_type: EntityType::from_model(&e.entity_type),
                description: e.description.trim().to_string(),
            })
        })
        .collect();

    let relations = raw
        .relations
        .into_iter()
        .filter_map(|r| {
            let source = r.source.trim().to_string();
            let target = r.target.trim().to_string();
            if !seen.contains(&source) || !seen.contains(&target) {
                return None;
            }
            Some(Relation {
                source,
                target,
                relation_type: RelationType::from_model(&r.relation_type),
            })
        })
        .collect();

    Extraction {
        entities,
        relations,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_fenced_json() {
        let response = "```json\n{\"entities\": [\
            {\"name\": \"Sync\", \"type\": \"Component\", \"description\": \"orchestrator\"},\
            {\"name\": \"Tokio\", \"type\": \"Technology\", \"description\": \"runtime\"}],\
            \"relations\": [{\"source\": \"Sync\", \"target\": \"Tokio\", \"type\": \"USES\"}]}\n```";
        let ex = parse_extraction(response);
        assert_eq!(ex.entities.len(), 2);
        assert_eq!(ex.entities[0].entity_type, EntityType::Component);
        assert_eq!(ex.relations.len(), 1);
        assert_eq!(ex.relations[0].relation_type, RelationType::Uses);
    }

    #[test]
    fn malformed_json_degrades_to_empty() {
        assert!(parse_extraction("not json at all").is_empty());
        assert!(parse_extraction("```json\n{\"entities\": [\n```").is_empty());
    }

    #[test]
    fn unknown_types_fall_back() {
        let ex = parse_extraction(
            r#"{"entities": [{"name": "X", "type": "Widget"}, {"name": "Y", "type": "api"}],
                "relations": [{"source": "X", "target": "Y", "type": "invokes"}]}"#,
        );
        assert_eq!(ex.entities[0].entity_type, EntityType::Concept);
        assert_eq!(ex.entities[1].entity_type, EntityType::Api);
        assert_eq!(ex.relations[0].relation_type, RelationType::RelatedTo);
    }

    #[test]
    fn drops_blank_duplicate_and_dangling() {
        let ex = parse_extraction(
            r#"{"entities": [{"name": " "}, {"name": "A"}, {"name": "A", "type": "API"}],
                "relations": [{"source": "A", "target": "Missing", "type": "USES"}]}"#,
        );
        assert_eq!(ex.entities.len(), 1);
        assert_eq!(ex.entities[0].entity_type, EntityType::Concept);
        assert!(ex.relations.is_empty());
    }

    #[test]
    fn missing_sections_default_to_empty() {
        let ex = parse_extraction(r#"{"entities": [{"name": "Solo"}]}"#);
        assert_eq!(ex.entities.len(), 1);
        assert!(ex.relations.is_empty());
    }

    #[test]
    fn prompt_embeds_chunk_text() {
        let prompt = extraction_prompt("Install with cargo.");
        assert!(prompt.contains("Install with cargo."));
        assert!(prompt.contains("DEPENDS_ON"));
    }
}
