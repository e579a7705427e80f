//! Property tests for workflow decoding and stage progress

use adw_progress::{decode, is_valid_identifier, StageSequence};
use proptest::prelude::*;

fn token_strategy() -> impl Strategy<Value = String> {
    "[a-z]{1,10}".prop_filter("sdlc is a reserved shorthand", |token| token != "sdlc")
}

fn tokens_strategy() -> impl Strategy<Value = Vec<String>> {
    prop::collection::vec(token_strategy(), 1..8)
}

proptest! {
    #[test]
    fn decode_returns_tokens_in_order(tokens in tokens_strategy()) {
        let identifier = format!("adw_{}_iso", tokens.join("_"));
        let decoded: Vec<String> = decode(&identifier).iter().map(|s| s.to_string()).collect();
        prop_assert_eq!(decoded, tokens);
        prop_assert!(is_valid_identifier(&identifier));
    }

    #[test]
    fn decode_is_deterministic(raw in "[a-zA-Z_]{0,40}") {
        prop_assert_eq!(decode(&raw), decode(&raw));
    }

    #[test]
    fn index_of_round_trips(tokens in tokens_strategy()) {
        let sequence = StageSequence::new(tokens.iter().map(String::as_str));
        for (position, stage) in sequence.iter().enumerate() {
            // Duplicated tokens resolve to their first occurrence
            let first = sequence.iter().position(|candidate| candidate == stage);
            prop_assert_eq!(sequence.index_of(stage.as_str()), first);
            prop_assert!(first.unwrap() <= position);
        }
    }

    #[test]
    fn last_stage_has_no_next_and_is_complete(tokens in tokens_strategy()) {
        let sequence = StageSequence::new(tokens.iter().map(String::as_str));
        let last = sequence.last_stage().unwrap().as_str().to_string();
        if sequence.iter().filter(|stage| stage.as_str() == last).count() == 1 {
            prop_assert!(sequence.next_stage(&last).is_none());
            prop_assert!(sequence.is_complete(&last));
            prop_assert_eq!(sequence.completion_percentage(&last), 100);
        }
    }

    #[test]
    fn percentage_increases_along_distinct_sequence(count in 1usize..20) {
        let tokens: Vec<String> = (0..count).map(|i| format!("stage{i}")).collect();
        let sequence = StageSequence::new(tokens.iter().map(String::as_str));
        let percentages: Vec<u32> = tokens
            .iter()
            .map(|token| sequence.completion_percentage(token))
            .collect();
        prop_assert!(percentages.windows(2).all(|pair| pair[0] < pair[1]));
        prop_assert!(percentages[0] > 0);
        prop_assert_eq!(*percentages.last().unwrap(), 100);
    }
}
