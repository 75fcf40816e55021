use crate::paragraph::Paragraph;

/// Renders paragraphs as `"{speaker}: {text} "` runs, one line per paragraph.
pub fn format_transcript(paragraphs: &[Paragraph]) -> String {
    let mut output = String::new();
    for paragraph in paragraphs {
        for message in paragraph {
            output.push_str(&format!("{}: {} ", message.speaker, message.text));
        }
        output.push('\n');
    }
    output
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::classify::{ClassifiedMessage, Speaker};

    #[test]
    fn one_line_per_paragraph() {
        let paragraphs = vec![
            vec![
                ClassifiedMessage::new(10.0, Speaker::Them, "hi"),
                ClassifiedMessage::new(15.0, Speaker::Them, "you there?"),
            ],
            vec![ClassifiedMessage::new(40.0, Speaker::Me, "yes")],
        ];
        assert_eq!(
            format_transcript(&paragraphs),
            "A: hi A: you there? \n我: yes \n"
        );
    }

    #[test]
    fn empty_input_renders_nothing() {
        assert_eq!(format_transcript(&[]), "");
    }
}
