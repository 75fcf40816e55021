use float_ord::FloatOrd;

use crate::classify::ClassifiedMessage;

/// Vertical distance between consecutive lines at which a new bubble starts.
pub const PARAGRAPH_GAP: f64 = 20.0;

const INITIAL_TOP: f64 = -999.0;

pub type Paragraph = Vec<ClassifiedMessage>;

/// Orders the messages of one image top to bottom and splits them into
/// paragraphs wherever the gap to the previous line reaches [`PARAGRAPH_GAP`].
///
/// The first line of a screenshot often picks up the chat header's back
/// chevron, so one leading `<` is removed from the topmost message.
pub fn group_paragraphs(mut messages: Vec<ClassifiedMessage>) -> Vec<Paragraph> {
    // FloatOrd is total: NaN tops sort after every finite one.
    messages.sort_by_key(|message| FloatOrd(message.top));

    if let Some(first) = messages.first_mut() {
        if let Some(stripped) = first.text.strip_prefix('<') {
            first.text = stripped.to_string();
        }
    }

    let mut paragraphs = Vec::new();
    let mut current: Paragraph = Vec::new();
    let mut last_top = INITIAL_TOP;
    for message in messages {
        let top = message.top;
        let continues = current.is_empty() || top - last_top < PARAGRAPH_GAP;
        if !continues {
            paragraphs.push(std::mem::take(&mut current));
        }
        current.push(message);
        last_top = top;
    }
    if !current.is_empty() {
        paragraphs.push(current);
    }
    paragraphs
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::classify::Speaker;

    fn msg(top: f64, text: &str) -> ClassifiedMessage {
        ClassifiedMessage::new(top, Speaker::Them, text)
    }

    fn tops(paragraphs: &[Paragraph]) -> Vec<Vec<f64>> {
        paragraphs
            .iter()
            .map(|p| p.iter().map(|m| m.top).collect())
            .collect()
    }

    #[test]
    fn wide_gaps_split_every_message() {
        let paragraphs = group_paragraphs(vec![msg(0.0, "a"), msg(20.0, "b"), msg(60.0, "c")]);
        assert_eq!(tops(&paragraphs), vec![vec![0.0], vec![20.0], vec![60.0]]);
    }

    #[test]
    fn narrow_gaps_form_one_paragraph() {
        let paragraphs = group_paragraphs(vec![
            msg(0.0, "a"),
            msg(19.0, "b"),
            msg(38.0, "c"),
            msg(57.9, "d"),
        ]);
        assert_eq!(paragraphs.len(), 1);
        assert_eq!(paragraphs[0].len(), 4);
    }

    #[test]
    fn gap_is_measured_from_previous_line() {
        // 0 → 15 → 30 never reaches 20 between neighbours even though 30 - 0 does.
        let paragraphs = group_paragraphs(vec![msg(30.0, "c"), msg(0.0, "a"), msg(15.0, "b")]);
        assert_eq!(tops(&paragraphs), vec![vec![0.0, 15.0, 30.0]]);
    }

    #[test]
    fn sort_is_stable_for_equal_tops() {
        let paragraphs = group_paragraphs(vec![msg(5.0, "first"), msg(5.0, "second")]);
        let texts = paragraphs[0].iter().map(|m| m.text.as_str()).collect::<Vec<_>>();
        assert_eq!(texts, vec!["first", "second"]);
    }

    #[test]
    fn strips_chevron_from_topmost_message_only() {
        let paragraphs = group_paragraphs(vec![msg(50.0, "<later"), msg(10.0, "<Hello")]);
        assert_eq!(paragraphs[0][0].text, "Hello");
        assert_eq!(paragraphs[1][0].text, "<later");
    }

    #[test]
    fn strips_a_single_chevron() {
        let paragraphs = group_paragraphs(vec![msg(0.0, "<<quoted")]);
        assert_eq!(paragraphs[0][0].text, "<quoted");
    }

    #[test]
    fn nan_tops_are_kept_and_start_their_own_paragraphs() {
        let messages = (0..50)
            .map(|i| {
                let top = if i % 3 == 0 { f64::NAN } else { i as f64 * 5.0 };
                msg(top, &format!("line {i}"))
            })
            .collect::<Vec<_>>();

        let paragraphs = group_paragraphs(messages);
        let mut texts = paragraphs
            .iter()
            .flatten()
            .map(|m| m.text.clone())
            .collect::<Vec<_>>();
        texts.sort();
        let mut expected = (0..50).map(|i| format!("line {i}")).collect::<Vec<_>>();
        expected.sort();
        assert_eq!(texts, expected);

        let finite = paragraphs
            .iter()
            .flatten()
            .take_while(|m| !m.top.is_nan())
            .count();
        assert_eq!(finite, 33);
        let nan_paragraphs = paragraphs
            .iter()
            .filter(|p| p.iter().all(|m| m.top.is_nan()))
            .collect::<Vec<_>>();
        assert_eq!(nan_paragraphs.len(), 17);
        assert!(nan_paragraphs.iter().all(|p| p.len() == 1));
    }

    #[test]
    fn no_messages_no_paragraphs() {
        assert!(group_paragraphs(Vec::new()).is_empty());
    }
}
