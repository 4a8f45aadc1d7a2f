//! crates/storybook_core/src/prompts.rs
//!
//! Prompt templates for story text generation and for each kind of image.

use crate::domain::{Story, StoryRequest, Style};

const STORY_SYSTEM_TEMPLATE: &str = r#"You are a story generation assistant. Given a structured input describing a protagonist, story premise, visual style, and target page length, you will generate a children's story accordingly. Follow these rules carefully:
1. Begin with a captivating opening that introduces the protagonist and the setting.
2. Develop the story through a series of pages, each with a specific illustration prompt.
3. Ensure the story is age-appropriate, engaging, and imaginative.
4. Incorporate the specified visual style into the illustration prompts.
5. Adhere to the target page length, ensuring each page contributes to the overall narrative.
6. Conclude with a satisfying ending that wraps up the story. Ensure the story is complete and coherent and has a clear moral or lesson.
7. Ensure the protagonist resembles (in terms of features) the attached reference image.
8. Ensure there are at least 2 characters in the story including the protagonist.

Ensure the output is in valid JSON format as per the following schema:
{story_schema}

Do not include any explanations or additional text outside the JSON structure. DO NOT OMIT ANY FIELDS. DO NOT include $defs or $schema in the output. Ensure the JSON is properly formatted and can be parsed without errors."#;

const STORY_USER_TEMPLATE: &str = r#"You are a story generation assistant. Given the below details about the story to be generated, you will generate a children's story accordingly.

Here are some of the protagonist details: {protagonist_details}
The story should be {page_count} pages long. Every page has a maximum of 3 sentences.
The art style for the illustrations should be {style}.
The story premise is as follows: {premise}
The target audience for the story is: {audience}. Adjust your language, vocabulary, and themes to be suitable for this age group."#;

const CHARACTER_SHEET_TEMPLATE: &str = r#"Given a detailed character sheet prompt, you will generate a character sheet image for a children's story. The character sheet should include a full-body view of the protagonist and other key characters in the story. Ensure the characters are depicted in a way that reflects their personalities and roles within the story. Each of the characters is bordered with an outline. The background is white. The characters should be clearly visible and easily distinguishable from one another. All the characters should be in a single image and should be in a collage format. The characters should be portrayed in {style} style and should be full bodied.{protagonist_image_prompt} All the characters should have a border around their image and a name under their corresponding image within the border. These are the character details:
{character_sheet_prompt}"#;

const REFERENCE_IMAGE_SENTENCE: &str = " The protagonist should resemble the attached reference image.";

const COVER_IMAGE_TEMPLATE: &str = r#"Given a detailed cover image prompt, you will generate a cover image for a children's story. The cover image should feature all the main characters in the story in a collage format. The title of the story should be prominently displayed on the cover. The characters should be depicted in a way that reflects their personalities and roles within the story. The cover should be visually appealing and engaging, capturing the essence of the story. The characters should be clearly visible and easily distinguishable from one another. The background should be vibrant and colorful, drawing attention to the cover. The characters should be portrayed in {style} style. Use the attached character sheet as a reference for the characters' appearances. The only text on the cover should be the title of the story. No other text should be present on the cover e.g. author's name, illustrator's name, tagline, etc.
The title of the story is: {story_title}"#;

const ILLUSTRATION_TEMPLATE: &str = r#"{image_prompt}
The text corresponding to the image is {image_text}.
Integrate the text seamlessly into the image composition. The text should be clearly legible, placed to avoid covering key visual elements or focal points. Use a bold, energetic comic book font in superhero style typography. The text should appear naturally as part of the scene, with appropriate lighting, perspective, and color contrast to maintain readability without disrupting the image's visual flow."#;

/// Name given to the story schema in structured-output requests.
pub const STORY_SCHEMA_NAME: &str = "story";

/// JSON schema of the [`Story`] record.
pub fn story_schema() -> serde_json::Value {
    let schema = schemars::schema_for!(Story);
    serde_json::to_value(schema).unwrap_or(serde_json::Value::Null)
}

/// Builds every prompt sent to the generative models.
#[derive(Debug, Clone, Copy)]
pub struct PromptBuilder {
    /// Whether page illustrations should render the page text inside the image.
    pub integrate_text_in_image: bool,
}

impl Default for PromptBuilder {
    fn default() -> Self {
        Self {
            integrate_text_in_image: true,
        }
    }
}

impl PromptBuilder {
    pub fn new(integrate_text_in_image: bool) -> Self {
        Self {
            integrate_text_in_image,
        }
    }

    /// System prompt for story generation, with `story_schema` embedded verbatim.
    pub fn story_system_prompt(&self, story_schema: &str) -> String {
        STORY_SYSTEM_TEMPLATE.replace("{story_schema}", story_schema)
    }

    pub fn story_user_prompt(&self, request: &StoryRequest) -> String {
        STORY_USER_TEMPLATE
            .replace("{protagonist_details}", &request.protagonist)
            .replace("{page_count}", request.page_count.as_str())
            .replace("{style}", request.style.as_str())
            .replace("{premise}", &request.premise)
            .replace("{audience}", request.audience.as_str())
    }

    /// The reference-image sentence is only present when a protagonist photo exists.
    pub fn character_sheet_prompt(
        &self,
        character_sheet_prompt: &str,
        style: Style,
        has_reference_image: bool,
    ) -> String {
        let reference = if has_reference_image {
            REFERENCE_IMAGE_SENTENCE
        } else {
            ""
        };
        CHARACTER_SHEET_TEMPLATE
            .replace("{style}", style.as_str())
            .replace("{protagonist_image_prompt}", reference)
            .replace("{character_sheet_prompt}", character_sheet_prompt)
    }

    pub fn cover_image_prompt(&self, story_title: &str, style: Style) -> String {
        COVER_IMAGE_TEMPLATE
            .replace("{style}", style.as_str())
            .replace("{story_title}", story_title)
    }

    pub fn illustration_prompt(&self, image_prompt: &str, image_text: &str) -> String {
        if self.integrate_text_in_image {
            ILLUSTRATION_TEMPLATE
                .replace("{image_prompt}", image_prompt)
                .replace("{image_text}", image_text)
        } else {
            image_prompt.to_string()
        }
    }
}
