#[cfg(test)]
mod tests {
    use crate::election::ElectionState;
    use crate::error::{ErrorCode, ErrorResponse, LedgerError};
    use crate::models::*;
    use crate::tally::{determine_outcome, OutcomeKind, NO_WINNER};
    use crate::validation::*;

    fn candidate(id: u64, name: &str, votes: u64) -> Candidate {
        Candidate { id: CandidateId(id), name: name.into(), vote_count: votes }
    }

    fn tally(candidates: Vec<Candidate>, declared: bool) -> Tally {
        let voters = candidates.iter().map(|c| c.vote_count).sum();
        Tally { candidates, results_declared: declared, recorded_voters: Some(voters) }
    }

    #[test]
    fn test_no_votes_has_no_winner() {
        let outcome = determine_outcome(&[candidate(1, "Alice", 0), candidate(2, "Bob", 0)]);
        assert_eq!(outcome.kind, OutcomeKind::NoVotes);
        assert_eq!(outcome.summary, NO_WINNER);
        assert!(!outcome.tie);
        assert!(outcome.winner().is_none());

        let outcome = determine_outcome(&[]);
        assert_eq!(outcome.kind, OutcomeKind::NoVotes);
    }

    #[test]
    fn test_single_winner() {
        let outcome = determine_outcome(&[candidate(1, "Alice", 2), candidate(2, "Bob", 1)]);
        assert_eq!(outcome.kind, OutcomeKind::Winner);
        assert_eq!(outcome.winner().map(|c| c.name.as_str()), Some("Alice"));
        assert_eq!(outcome.top_votes, 2);
        assert_eq!(outcome.summary, "Alice");
    }

    #[test]
    fn test_tie_lists_names_in_id_order() {
        let outcome = determine_outcome(&[
            candidate(3, "Carol", 3),
            candidate(1, "Alice", 3),
            candidate(2, "Bob", 1),
        ]);
        assert!(outcome.tie);
        assert_eq!(outcome.kind, OutcomeKind::Tie);
        assert_eq!(outcome.names(), vec!["Alice", "Carol"]);
        assert_eq!(outcome.summary, "Alice & Carol");
        assert!(outcome.winner().is_none());
    }

    #[test]
    fn test_outcome_only_after_declaration() {
        let open = tally(vec![candidate(1, "Alice", 1)], false);
        assert!(open.outcome().is_none());

        let declared = tally(vec![candidate(1, "Alice", 1)], true);
        assert_eq!(declared.outcome().unwrap().summary, "Alice");
    }

    #[test]
    fn test_state_transitions() {
        let state = ElectionState::default();
        assert_eq!(state, ElectionState::Open);
        assert!(state.ensure_open().is_ok());

        let declared = state.declare().unwrap();
        assert!(declared.is_declared());
        assert_eq!(declared.ensure_open(), Err(LedgerError::ElectionClosed));
        assert_eq!(declared.declare(), Err(LedgerError::AlreadyDeclared));
        assert_eq!(declared.reset(), ElectionState::Open);
        assert_eq!(ElectionState::from_declared(true), ElectionState::Declared);
    }

    #[test]
    fn test_consistency_check() {
        let mut t = tally(vec![candidate(1, "Alice", 2), candidate(2, "Bob", 1)], false);
        assert!(t.is_consistent());
        assert_eq!(t.total_votes(), 3);

        t.recorded_voters = Some(2);
        assert!(!t.is_consistent());

        t.recorded_voters = None;
        assert!(t.is_consistent());
    }

    #[test]
    fn test_public_results_hide_counts_until_declared() {
        let open = tally(vec![candidate(1, "Alice", 2), candidate(2, "Bob", 1)], false);
        let view = PublicResults::from_tally(&open, true);
        assert_eq!(view.total_votes, 0);
        assert!(view.user_has_voted);
        assert!(view.winner.is_none());
        assert!(view.candidates.iter().all(|c| c.vote_count.is_none()));

        let declared = tally(open.candidates.clone(), true);
        let view = PublicResults::from_tally(&declared, false);
        assert_eq!(view.total_votes, 3);
        assert_eq!(view.candidates[0].vote_count, Some(2));
        assert_eq!(view.winner.unwrap().summary, "Alice");
    }

    #[test]
    fn test_admin_results_always_show_counts() {
        let results = AdminResults::from(tally(vec![candidate(1, "Alice", 4)], false));
        assert_eq!(results.total_votes, 4);
        assert_eq!(results.candidates[0].vote_count, 4);
        assert!(results.winner.is_none());
    }

    #[test]
    fn test_candidate_name_validation() {
        assert_eq!(validate_candidate_name("  Alice  ").unwrap(), "Alice");
        assert_eq!(validate_candidate_name("   "), Err(ValidationError::EmptyName));
        assert_eq!(validate_candidate_name(""), Err(ValidationError::EmptyName));
        assert_eq!(
            validate_candidate_name(&"x".repeat(MAX_CANDIDATE_NAME_LENGTH + 1)),
            Err(ValidationError::NameTooLong)
        );

        let err: LedgerError = ValidationError::EmptyName.into();
        assert_eq!(err.code(), ErrorCode::InvalidInput);
    }

    #[test]
    fn test_vote_request_accepts_both_spellings() {
        let snake: VoteRequest = serde_json::from_str(r#"{"candidate_id": 2}"#).unwrap();
        let camel: VoteRequest = serde_json::from_str(r#"{"candidateId": 2}"#).unwrap();
        let missing: VoteRequest = serde_json::from_str("{}").unwrap();

        assert_eq!(require_candidate(snake.candidate_id), Ok(CandidateId(2)));
        assert_eq!(require_candidate(camel.candidate_id), Ok(CandidateId(2)));
        assert_eq!(require_candidate(missing.candidate_id), Err(ValidationError::MissingCandidate));
    }

    #[test]
    fn test_vote_request_accepts_string_ids() {
        let snake: VoteRequest = serde_json::from_str(r#"{"candidate_id": "1"}"#).unwrap();
        let camel: VoteRequest = serde_json::from_str(r#"{"candidateId": " 2 "}"#).unwrap();
        let blank: VoteRequest = serde_json::from_str(r#"{"candidateId": ""}"#).unwrap();
        let bogus: VoteRequest = serde_json::from_str(r#"{"candidateId": "two"}"#).unwrap();

        assert_eq!(require_candidate(snake.candidate_id), Ok(CandidateId(1)));
        assert_eq!(require_candidate(camel.candidate_id), Ok(CandidateId(2)));
        assert_eq!(require_candidate(blank.candidate_id), Err(ValidationError::MissingCandidate));
        assert_eq!(
            require_candidate(bogus.candidate_id),
            Err(ValidationError::InvalidCandidate("two".into()))
        );

        let err: LedgerError = ValidationError::InvalidCandidate("two".into()).into();
        assert_eq!(err.code(), ErrorCode::InvalidInput);
    }

    #[test]
    fn test_registration_validation() {
        assert!(validate_registration("alice", "secret").is_ok());
        assert_eq!(validate_registration("", "secret"), Err(ValidationError::MissingCredentials));
        assert_eq!(validate_registration("alice", ""), Err(ValidationError::MissingCredentials));
        assert_eq!(validate_registration("alice", "abc"), Err(ValidationError::PasswordTooShort));
    }

    #[test]
    fn test_voter_id_trims_and_rejects_empty() {
        assert_eq!(VoterId::new("  0xabc ").unwrap().as_str(), "0xabc");
        assert!(VoterId::new("   ").is_none());
    }

    #[test]
    fn test_error_codes() {
        assert_eq!(LedgerError::AlreadyVoted.code(), ErrorCode::AlreadyVoted);
        assert!(LedgerError::conflict("retry").is_retryable());
        assert!(!LedgerError::unavailable("timeout").is_retryable());

        let body = ErrorResponse::from(&LedgerError::CandidateNotFound(CandidateId(9)));
        assert_eq!(body.code, ErrorCode::CandidateNotFound);
        assert_eq!(body.error, "Candidate 9 not found.");
        assert_eq!(
            serde_json::to_value(&body).unwrap()["code"],
            serde_json::json!("candidateNotFound")
        );
    }
}
