use specforge::accumulator::{ConsoleEcho, accumulate};
use specforge::llm::{Invocation, ResponseChunk};

use futures::executor::block_on;
use proptest::prelude::*;

fn sequence(texts: &[String], finished: bool) -> Vec<ResponseChunk> {
    let last = texts.len().saturating_sub(1);
    texts
        .iter()
        .enumerate()
        .map(|(index, text)| ResponseChunk {
            index,
            text: text.clone(),
            done: finished && index == last,
        })
        .collect()
}

proptest! {
    #[test]
    fn observer_does_not_change_accumulated_text(
        texts in proptest::collection::vec("\\PC{0,20}", 0..30),
        finished in any::<bool>(),
    ) {
        let chunks = sequence(&texts, finished);

        let plain = block_on(accumulate(Invocation::from_chunks(chunks.clone(), true), None))
            .expect("accumulate without observer");

        let mut seen = 0_usize;
        let mut counter = |_: &ResponseChunk| -> anyhow::Result<()> {
            seen += 1;
            Ok(())
        };
        let observed = block_on(accumulate(
            Invocation::from_chunks(chunks.clone(), true),
            Some(&mut counter),
        ))
        .expect("accumulate with observer");

        prop_assert_eq!(&plain.full_text, &texts.concat());
        prop_assert_eq!(&plain.full_text, &observed.full_text);
        prop_assert_eq!(plain.chunk_count, texts.len());
        prop_assert_eq!(seen, texts.len());
        prop_assert_eq!(plain.completed, finished && !texts.is_empty());
    }
}

#[tokio::test]
async fn console_echo_writes_text_as_it_arrives() {
    let texts: Vec<String> = ["def test_", "health():", "\n    assert True"]
        .iter()
        .map(|s| (*s).to_string())
        .collect();
    let mut echo = ConsoleEcho::new(Vec::new());

    let response = accumulate(
        Invocation::from_chunks(sequence(&texts, true), true),
        Some(&mut echo),
    )
    .await
    .expect("accumulate");

    let echoed = String::from_utf8(echo.into_inner()).expect("utf8");
    assert_eq!(echoed, format!("{}\n", response.full_text));
}

#[tokio::test]
async fn stream_without_completion_is_marked_incomplete() {
    let texts = vec!["partial ".to_string(), "answer".to_string()];
    let response = accumulate(Invocation::from_chunks(sequence(&texts, false), true), None)
        .await
        .expect("accumulate");
    assert_eq!(response.full_text, "partial answer");
    assert!(!response.completed);
}
