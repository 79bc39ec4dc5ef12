// Any document the editing commands can produce survives both persisted forms

use proptest::prelude::*;
use reviewdoc::media::{extract_references, extract_references_from_text};
use reviewdoc::richtext::*;

#[derive(Debug, Clone)]
enum Op {
    Type(String),
    Paste(String),
    ToggleMark(Mark),
    ToggleBlock(BlockToggle),
    Split,
    ExitList,
    Backspace,
    Delete,
    DeleteToBlockStart,
    Image(u8),
    Select {
        anchor: (usize, usize),
        focus: (usize, usize),
    },
}

/// Text heavy in characters both formats have to escape
fn arb_text() -> impl Strategy<Value = String> {
    r"[ab1é \t*_#\-+=.)<>&\\\[\]!~|`\x0B\x0C]{1,8}"
}

fn arb_pasted() -> impl Strategy<Value = String> {
    r"[ab \t*#\-1.\r\n]{1,12}"
}

fn arb_mark() -> impl Strategy<Value = Mark> {
    prop_oneof![Just(Mark::Bold), Just(Mark::Italic), Just(Mark::Underline)]
}

fn arb_block_toggle() -> impl Strategy<Value = BlockToggle> {
    prop_oneof![
        Just(BlockToggle::Paragraph),
        Just(BlockToggle::Heading(HeadingLevel::One)),
        Just(BlockToggle::Heading(HeadingLevel::Two)),
        Just(BlockToggle::Heading(HeadingLevel::Three)),
        Just(BlockToggle::OrderedList),
        Just(BlockToggle::UnorderedList),
    ]
}

fn arb_position() -> impl Strategy<Value = (usize, usize)> {
    (0usize..8, 0usize..12)
}

fn arb_op() -> impl Strategy<Value = Op> {
    prop_oneof![
        4 => arb_text().prop_map(Op::Type),
        1 => arb_pasted().prop_map(Op::Paste),
        2 => arb_mark().prop_map(Op::ToggleMark),
        2 => arb_block_toggle().prop_map(Op::ToggleBlock),
        4 => prop_oneof![
            2 => Just(Op::Split),
            1 => Just(Op::ExitList),
            1 => Just(Op::Backspace),
            1 => Just(Op::Delete),
            1 => Just(Op::DeleteToBlockStart),
        ],
        1 => (0u8..3).prop_map(Op::Image),
        2 => (arb_position(), arb_position())
            .prop_map(|(anchor, focus)| Op::Select { anchor, focus }),
    ]
}

fn image_url(id: u8) -> String {
    format!("https://cdn.example.com/review-images/img{id}.png")
}

/// Run one command; unhandled commands leave the state as it was
fn apply(state: &EditorState, op: &Op) -> EditorState {
    let (next, _) = match op {
        Op::Type(text) => state.insert_text(text),
        Op::Paste(text) => state.paste_text(text),
        Op::ToggleMark(mark) => state.toggle_inline_mark(*mark),
        Op::ToggleBlock(toggle) => state.toggle_block_type(*toggle),
        Op::Split => state.split_block(),
        Op::ExitList => state.exit_list(),
        Op::Backspace => state.delete_backward(),
        Op::Delete => state.delete_forward(),
        Op::DeleteToBlockStart => state.delete_to_block_start(),
        Op::Image(id) => state.insert_image_placeholder(&format!("img{id}"), &image_url(*id)),
        Op::Select { anchor, focus } => {
            let doc = &state.document;
            let selection = Selection::new(
                doc.position_at(anchor.0, anchor.1),
                doc.position_at(focus.0, focus.1),
            );
            return state.set_selection(selection);
        }
    };
    next
}

fn edited_document(ops: &[Op]) -> StructuredDocument {
    ops.iter()
        .fold(EditorState::new(), |state, op| apply(&state, op))
        .document
}

proptest! {
    #[test]
    fn prop_edited_documents_round_trip(ops in prop::collection::vec(arb_op(), 0..40)) {
        let doc = edited_document(&ops);
        for format in [ReviewFormat::Html, ReviewFormat::Markdown] {
            let text = format.serialize(&doc);
            let back = format.deserialize(&text);
            prop_assert_eq!(&back, &doc, "{} form:\n{}", format, text);
            prop_assert_eq!(format.serialize(&back), text);
        }
    }

    #[test]
    fn prop_extractor_agrees_with_edited_document(ops in prop::collection::vec(arb_op(), 0..40)) {
        let doc = edited_document(&ops);
        let expected = extract_references(&doc);
        for format in [ReviewFormat::Html, ReviewFormat::Markdown] {
            let text = format.serialize(&doc);
            prop_assert_eq!(extract_references_from_text(format, &text), expected.clone());
        }
    }
}
