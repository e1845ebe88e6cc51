//! LLM 请求 schema 与响应类型
//!
//! 所有对 LLM 的调用都附带 JSON Schema 约束，响应按这里的类型反序列化

use serde::Deserialize;
use serde_json::{json, Value};

/// 元数据推断的系统提示词
pub const METADATA_SYSTEM_PROMPT: &str = "You are a literary analyst. Analyze the provided book excerpt.
Extract the Title, Author, and a short Description (2-3 sentences).
If the title or author cannot be determined from the text, provide your best inference.
Return strictly a JSON object with the specified fields.";

/// 场景生成的系统提示词
pub const SCENE_SYSTEM_PROMPT: &str = "You are a narrative analyst for visual storytelling.
Your task is to analyze a chapter and identify key scenes for visual representation.

For each section, create a scene with:
1. A concise summary of the action/events
2. An importance score (0.0-1.0) - higher for pivotal moments
3. Scene type classification
4. A detailed image prompt that captures the visual essence

Image prompts should:
- Describe the scene composition, characters, setting, and mood
- Be specific about visual details (lighting, colors, atmosphere)
- Maintain consistency with the story's tone
- Be suitable for AI image generation (avoid text/dialogue in images)

Return a JSON object with an array of scenes.";

pub fn metadata_user_prompt(sample_text: &str) -> String {
    format!(
        "Analyze this book excerpt and extract metadata:\n\n{}",
        sample_text
    )
}

pub fn scene_user_prompt(chapter_text: &str) -> String {
    format!(
        "Analyze this chapter and generate scenes for visual storytelling:\n\n{}\n\nCreate one scene per section. Focus on the most visually compelling moments.",
        chapter_text
    )
}

/// 元数据推断的响应 schema
pub fn metadata_schema() -> Value {
    json!({
        "type": "object",
        "properties": {
            "title": {
                "type": "string",
                "description": "The title of the book"
            },
            "author": {
                "type": "string",
                "description": "The author's name"
            },
            "description": {
                "type": "string",
                "description": "A brief description or summary of the book (2-3 sentences)"
            },
            "genre": {
                "type": "string",
                "description": "The primary genre of the book"
            }
        },
        "required": ["title", "author", "description"]
    })
}

/// 场景生成的响应 schema
pub fn scene_schema() -> Value {
    json!({
        "type": "object",
        "properties": {
            "scenes": {
                "type": "array",
                "items": {
                    "type": "object",
                    "properties": {
                        "section_number": {
                            "type": "integer",
                            "description": "The section number this scene belongs to"
                        },
                        "summary": {
                            "type": "string",
                            "description": "A 2-3 sentence summary of what happens in this scene"
                        },
                        "importance_score": {
                            "type": "number",
                            "description": "How important this scene is to the story (0.0 to 1.0)"
                        },
                        "scene_type": {
                            "type": "string",
                            "description": "Type of scene: action, dialogue, exposition, climax, resolution"
                        },
                        "image_prompt": {
                            "type": "string",
                            "description": "A detailed visual prompt for image generation, describing the scene, characters, setting, mood, and style"
                        },
                        "characters": {
                            "type": "array",
                            "items": { "type": "string" },
                            "description": "List of character names present in this scene"
                        },
                        "location": {
                            "type": "string",
                            "description": "Where the scene takes place"
                        },
                        "mood": {
                            "type": "string",
                            "description": "The emotional tone: tense, peaceful, joyful, dark, mysterious, etc."
                        }
                    },
                    "required": ["section_number", "summary", "importance_score", "scene_type", "image_prompt"]
                }
            }
        },
        "required": ["scenes"]
    })
}

/// LLM 推断出的书籍元数据
#[derive(Debug, Clone, Deserialize)]
pub struct InferredMetadata {
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub author: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub genre: String,
}

/// LLM 生成的单个场景
#[derive(Debug, Clone, Deserialize)]
pub struct GeneratedScene {
    pub section_number: usize,
    pub summary: String,
    pub importance_score: f64,
    pub scene_type: String,
    pub image_prompt: String,
    #[serde(default)]
    pub characters: Vec<String>,
    #[serde(default)]
    pub location: String,
    #[serde(default)]
    pub mood: String,
}

/// 场景生成响应
#[derive(Debug, Clone, Deserialize)]
pub struct SceneGenerationResponse {
    pub scenes: Vec<GeneratedScene>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scene_response_deserializes() {
        let raw = r#"{
            "scenes": [{
                "section_number": 1,
                "summary": "The crew sets sail at dawn.",
                "importance_score": 0.7,
                "scene_type": "exposition",
                "image_prompt": "A whaling ship leaving a misty harbor at sunrise",
                "characters": ["Ishmael", "Queequeg"],
                "location": "Nantucket harbor",
                "mood": "hopeful"
            }]
        }"#;

        let response: SceneGenerationResponse = serde_json::from_str(raw).unwrap();
        assert_eq!(response.scenes.len(), 1);
        assert_eq!(response.scenes[0].section_number, 1);
        assert_eq!(response.scenes[0].characters.len(), 2);
    }

    #[test]
    fn test_scene_optional_fields_default() {
        let raw = r#"{
            "scenes": [{
                "section_number": 2,
                "summary": "s",
                "importance_score": 0.1,
                "scene_type": "dialogue",
                "image_prompt": "p"
            }]
        }"#;

        let response: SceneGenerationResponse = serde_json::from_str(raw).unwrap();
        assert!(response.scenes[0].characters.is_empty());
        assert!(response.scenes[0].location.is_empty());
    }

    #[test]
    fn test_metadata_fields_default_when_missing() {
        let meta: InferredMetadata = serde_json::from_str(r#"{"title": "Moby Dick"}"#).unwrap();
        assert_eq!(meta.title, "Moby Dick");
        assert!(meta.author.is_empty());
    }

    #[test]
    fn test_schemas_declare_required_fields() {
        let schema = metadata_schema();
        assert_eq!(schema["required"][0], "title");

        let schema = scene_schema();
        let required = &schema["properties"]["scenes"]["items"]["required"];
        assert!(required.as_array().unwrap().len() >= 5);
    }
}
