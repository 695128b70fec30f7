//! Conversation builders for every pipeline stage. Each builder returns a
//! complete, self-contained conversation.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::book_spec::BOOK_SPEC_FIELDS;
use crate::llm::Message;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StoryForm {
    #[default]
    Novel,
    Screenplay,
}

impl StoryForm {
    pub fn as_str(&self) -> &'static str {
        match self {
            StoryForm::Novel => "novel",
            StoryForm::Screenplay => "screenplay",
        }
    }
}

impl fmt::Display for StoryForm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Lead-in for the windowed tail of the previous scene in a scene prompt.
pub const PREV_SCENE_INTRO: &str = "\n\nHere is the ending of the previous scene, your text should continue seamlessly from it: ";

/// Lead-in for the current partial scene when resuming a cut-off generation.
pub const CUR_SCENE_INTRO: &str = "\n\nHere is the scene text so far, continue directly from where it stops: ";

fn system_message(form: StoryForm) -> Message {
    Message::system(format!(
        "You are an experienced fiction writer working on a new {form}. \
         You write vivid, concrete prose and you follow formatting \
         instructions exactly."
    ))
}

pub fn init_book_spec_messages(topic: &str, form: StoryForm) -> Vec<Message> {
    let field_list = BOOK_SPEC_FIELDS
        .iter()
        .map(|field| format!("{field}:"))
        .collect::<Vec<_>>()
        .join("\n");
    vec![
        system_message(form),
        Message::user(format!(
            "Write a specification for a {form} on the following topic: \"{topic}\".\n\
             Fill in every field below with concrete, specific details. Answer with \
             one field per line in the exact format \"Field: value\" and nothing \
             else.\n\n{field_list}"
        )),
    ]
}

pub fn missing_book_spec_messages(field: &str, spec_text: &str) -> Vec<Message> {
    vec![
        Message::system(
            "You are an experienced fiction writer. Answer with a single line and \
             nothing else.",
        ),
        Message::user(format!(
            "Here is the current specification of a story:\n\n{spec_text}\n\n\
             The field \"{field}\" is still empty. Invent a fitting value for it. \
             Answer with one line in the exact format \"{field}: value\"."
        )),
    ]
}

pub fn enhance_book_spec_messages(book_spec: &str, form: StoryForm) -> Vec<Message> {
    vec![
        system_message(form),
        Message::user(format!(
            "Make the following {form} specification more detailed and concrete. \
             Keep every field, keep the \"Field: value\" line format, and do not \
             invent new field names.\n\n{book_spec}"
        )),
    ]
}

pub fn create_plot_chapters_messages(book_spec: &str, form: StoryForm) -> Vec<Message> {
    vec![
        system_message(form),
        Message::user(format!(
            "Create a three-act plot outline for the {form} specified below. Each \
             act needs at least two chapters, and chapters are numbered \
             continuously across the whole outline, not per act. Use exactly this \
             format:\n\n\
             Act 1: <one-sentence summary of the act>\n\
             - Chapter 1: <what happens in this chapter>\n\
             - Chapter 2: <what happens in this chapter>\n\
             Act 2: <one-sentence summary of the act>\n\
             - Chapter 3: <what happens in this chapter>\n\
             ...\n\n\
             Specification:\n{book_spec}"
        )),
    ]
}

pub fn enhance_plot_chapters_messages(
    act_num: usize,
    text_plan: &str,
    book_spec: &str,
    form: StoryForm,
) -> Vec<Message> {
    vec![
        system_message(form),
        Message::user(format!(
            "Below are the specification and the current outline of a {form}.\n\n\
             Specification:\n{book_spec}\n\n\
             Outline:\n{text_plan}\n\n\
             Rewrite Act {act_num} to make its flow more engaging, with clearer \
             stakes and stronger chapter hooks. Keep the outline's chapter \
             numbering. Answer with Act {act_num} only, in the same \
             \"Act N: ...\" and \"- Chapter N: ...\" format."
        )),
    ]
}

pub fn split_chapters_into_scenes_messages(
    act_num: usize,
    text_act: &str,
    form: StoryForm,
) -> Vec<Message> {
    vec![
        system_message(form),
        Message::user(format!(
            "Break every chapter of Act {act_num} of the {form} below into scenes. \
             For each chapter, list two to four scenes with a detailed description \
             of what happens in each scene. Use exactly this format:\n\n\
             Chapter N\n\
             Scene 1: <detailed description of the scene>\n\
             Scene 2: <detailed description of the scene>\n\n\
             {text_act}"
        )),
    ]
}

pub fn scene_messages(
    scene: &str,
    sc_num: usize,
    ch_num: usize,
    text_plan: &str,
    form: StoryForm,
) -> Vec<Message> {
    vec![
        system_message(form),
        Message::user(format!(
            "Write the full text of scene {sc_num} in chapter {ch_num} of the \
             {form} outlined below. Write immersive prose with dialogue and \
             sensory detail, stay inside this single scene, and do not write any \
             chapter or scene headings.\n\n\
             Scene description: {scene}\n\n\
             Outline:\n{text_plan}"
        )),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::Role;

    #[test]
    fn test_conversations_are_system_then_user() {
        let checks = [
            init_book_spec_messages("a lighthouse keeper", StoryForm::Novel),
            missing_book_spec_messages("Tone", "Genre: Fantasy"),
            enhance_book_spec_messages("Genre: Fantasy", StoryForm::Novel),
            create_plot_chapters_messages("Genre: Fantasy", StoryForm::Novel),
            enhance_plot_chapters_messages(2, "Act 1: ...", "Genre: Fantasy", StoryForm::Novel),
            split_chapters_into_scenes_messages(1, "Act 1: ...", StoryForm::Novel),
            scene_messages("The storm breaks", 1, 2, "Act 1: ...", StoryForm::Novel),
        ];
        for messages in checks {
            assert_eq!(messages.len(), 2);
            assert_eq!(messages[0].role, Role::System);
            assert_eq!(messages[1].role, Role::User);
        }
    }

    #[test]
    fn test_init_messages_list_every_field() {
        let messages = init_book_spec_messages("a heist on the moon", StoryForm::Novel);
        for field in BOOK_SPEC_FIELDS {
            assert!(messages[1].content.contains(&format!("{field}:")));
        }
        assert!(messages[1].content.contains("a heist on the moon"));
    }

    #[test]
    fn test_scene_messages_carry_numbers_and_plan() {
        let messages = scene_messages("The duel begins", 2, 5, "the whole outline", StoryForm::Novel);
        assert!(messages[1].content.contains("scene 2"));
        assert!(messages[1].content.contains("chapter 5"));
        assert!(messages[1].content.contains("the whole outline"));
    }

    #[test]
    fn test_form_renders_lowercase() {
        assert_eq!(StoryForm::Novel.to_string(), "novel");
        assert_eq!(StoryForm::Screenplay.to_string(), "screenplay");
        let messages = enhance_book_spec_messages("Genre: Noir", StoryForm::Screenplay);
        assert!(messages[1].content.contains("screenplay specification"));
    }
}
