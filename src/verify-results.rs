//! A simple CLI tool for checking a published results dump.
//! This recounts with the server's own tally, so it agrees with the output of
//! `GET /elections/<election_id>/dump` by construction.

use std::collections::HashSet;
use std::fmt::{Display, Formatter};
use std::fs::File;
use std::io::BufReader;

use clap::{Arg, ArgAction, ArgMatches, Command};
use rocket::serde::json::serde_json;

use ballot_backend::{
    model::{
        api::results::{ElectionResults, PositionResult, ResultsDump},
        common::election::PositionId,
    },
    voting::tally::Tally,
};

const PROGRAM_NAME: &str = "verify-results";

const ABOUT_TEXT: &str = "Verify the receipts and tally of a published election.

EXIT CODES:
     0: Verification succeeded.
   255: Ran successfully, but verification failed.
 Other: Error.";

const RESULTS_PATH: &str = "RESULTS_PATH";

const RESULTS_PATH_HELP: &str = "The path to a JSON dump of a completed election,\n\
as returned by `GET /elections/<election_id>/dump`";

/// Published percentages are decimal renderings of `f64`s, so allow for the
/// last digit when comparing them.
const PERCENTAGE_TOLERANCE: f64 = 1e-9;

/// Construct the CLI configuration.
fn cli() -> Command {
    // Make the build dirty when the toml changes.
    include_str!("../Cargo.toml");

    clap::command!(PROGRAM_NAME).about(ABOUT_TEXT).arg(
        Arg::new(RESULTS_PATH)
            .help(RESULTS_PATH_HELP)
            .action(ArgAction::Set)
            .required(true),
    )
}

/// Errors that this program may produce.
#[derive(Debug, PartialEq)]
enum Error {
    /// IO error described by the inner message.
    IO(String),
    /// Failed to decode the JSON dump.
    Format(String),
    /// Verification failed due to the contained reason.
    Verification(VerificationError),
}

/// Reasons a dump can fail verification.
#[derive(Debug, PartialEq, Eq)]
enum VerificationError {
    /// The receipt hash or verification code does not match the vote content.
    Receipt { verification_code: String },
    /// The same receipt appears more than once.
    DuplicateReceipt { verification_code: String },
    /// The vote breaks the ballot rules, e.g. an unknown choice or an overvote.
    InvalidVote { verification_code: String },
    /// The recount of a position differs from the published one.
    Tally { position_id: PositionId },
    /// The election-wide figures differ from the recount.
    Totals,
}

impl Display for VerificationError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Receipt { verification_code } => write!(
                f,
                "The receipt {verification_code} does not match its vote."
            ),
            Self::DuplicateReceipt { verification_code } => {
                write!(f, "The receipt {verification_code} is published twice.")
            }
            Self::InvalidVote { verification_code } => write!(
                f,
                "The vote with receipt {verification_code} is not valid for this ballot."
            ),
            Self::Tally { position_id } => {
                write!(f, "The results for position {position_id} are incorrect.")
            }
            Self::Totals => write!(f, "The turnout figures are incorrect."),
        }
    }
}

/// Run verification, returning the recounted results.
fn verify(path: &str) -> Result<ElectionResults, Error> {
    let file = BufReader::new(File::open(path).map_err(|e| Error::IO(e.to_string()))?);
    let dump: ResultsDump =
        serde_json::from_reader(file).map_err(|e| Error::Format(e.to_string()))?;
    verify_dump(&dump).map_err(Error::Verification)
}

fn verify_dump(dump: &ResultsDump) -> Result<ElectionResults, VerificationError> {
    let mut seen = HashSet::with_capacity(dump.votes.len());
    let mut tally = Tally::new(&dump.catalog);
    for vote in &dump.votes {
        if !vote.is_consistent() {
            return Err(VerificationError::Receipt {
                verification_code: vote.verification_code.clone(),
            });
        }
        if !seen.insert(vote.receipt_hash.as_str()) {
            return Err(VerificationError::DuplicateReceipt {
                verification_code: vote.verification_code.clone(),
            });
        }
        // Receipts are unique per vote, so they stand in for the absent voters.
        tally
            .add(&vote.receipt_hash, &vote.content)
            .map_err(|_| VerificationError::InvalidVote {
                verification_code: vote.verification_code.clone(),
            })?;
    }

    let recount = tally.finish(
        dump.catalog.election_id,
        dump.results.is_final,
        dump.eligible_voters,
    );
    compare(&dump.results, &recount)?;
    Ok(recount)
}

/// Check the published results against our recount.
fn compare(published: &ElectionResults, recount: &ElectionResults) -> Result<(), VerificationError> {
    for (index, expected) in recount.position_results.iter().enumerate() {
        let matches = published
            .position_results
            .get(index)
            .map(|actual| same_position(actual, expected))
            .unwrap_or(false);
        if !matches {
            return Err(VerificationError::Tally {
                position_id: expected.position.id,
            });
        }
    }
    if let Some(extra) = published
        .position_results
        .get(recount.position_results.len())
    {
        return Err(VerificationError::Tally {
            position_id: extra.position.id,
        });
    }

    if published.election_id != recount.election_id
        || published.total_votes != recount.total_votes
        || published.total_eligible_voters != recount.total_eligible_voters
        || !close(published.turnout_percentage, recount.turnout_percentage)
    {
        return Err(VerificationError::Totals);
    }
    Ok(())
}

fn same_position(actual: &PositionResult, expected: &PositionResult) -> bool {
    actual.position == expected.position
        && actual.winner == expected.winner
        && actual.tied_for_first == expected.tied_for_first
        && actual.total_votes == expected.total_votes
        && actual.abstained_votes == expected.abstained_votes
        && actual.ballots == expected.ballots
        && actual.results.len() == expected.results.len()
        && actual.results.iter().zip(&expected.results).all(|(a, e)| {
            a.candidate_id == e.candidate_id
                && a.vote_count == e.vote_count
                && a.rank == e.rank
                && close(a.percentage, e.percentage)
        })
}

fn close(a: f64, b: f64) -> bool {
    (a - b).abs() <= PERCENTAGE_TOLERANCE
}

/// Print a human-readable summary of verified results.
fn report(results: &ElectionResults) {
    println!(
        "{} of {} eligible voters voted ({:.1}%).",
        results.total_votes, results.total_eligible_voters, results.turnout_percentage
    );
    for position in &results.position_results {
        println!("{}:", position.position.name);
        for line in &position.results {
            println!(
                "  #{} {}: {} vote{} ({:.1}%)",
                line.rank,
                line.candidate_id,
                line.vote_count,
                if line.vote_count != 1 { "s" } else { "" },
                line.percentage
            );
        }
        if position.abstained_votes > 0 {
            println!("  {} abstained", position.abstained_votes);
        }
        match (&position.winner, position.tied_for_first.is_empty()) {
            (Some(winner), _) => println!("  Winner: {winner}"),
            (None, false) => println!("  Tied: {}", position.tied_for_first.join(", ")),
            (None, true) => println!("  No votes"),
        }
    }
    if !results.is_final {
        println!("These results are preliminary.");
    }
}

/// Run verification, report the result, and return the exit code.
fn run(args: &ArgMatches) -> u8 {
    let path: &String = args.get_one(RESULTS_PATH).unwrap(); // Required argument is guaranteed to be present.
    match verify(path) {
        Ok(results) => {
            println!("Verification succeeded.");
            report(&results);
            0
        }
        Err(Error::IO(msg)) => {
            println!("IO error: {msg}");
            1
        }
        Err(Error::Format(msg)) => {
            println!("Invalid JSON: {msg}");
            1
        }
        Err(Error::Verification(err)) => {
            println!("Verification failed: {err}");
            255
        }
    }
}

fn main() {
    let args = cli().get_matches();
    let exit_code = run(&args);
    std::process::exit(exit_code.into())
}

#[cfg(test)]
mod tests {
    use std::path::PathBuf;

    use chrono::Utc;

    use ballot_backend::model::{
        api::receipt::{receipt_hash, verification_code, PublishedVote},
        common::{
            ballot::PositionVote,
            election::{Candidate, Position},
        },
    };
    use ballot_backend::voting::catalog::BallotCatalog;

    use super::*;

    fn candidate(id: &str) -> Candidate {
        Candidate {
            id: id.to_string(),
            name: id.to_uppercase(),
            description: String::new(),
        }
    }

    fn catalog() -> BallotCatalog {
        BallotCatalog {
            election_id: 7,
            allow_abstain: true,
            positions: vec![
                Position {
                    id: 1,
                    name: "Chair".to_string(),
                    min_selections: 1,
                    max_selections: 1,
                    order: 1,
                    candidates: vec![candidate("alice"), candidate("bob")],
                },
                Position {
                    id: 2,
                    name: "Committee".to_string(),
                    min_selections: 1,
                    max_selections: 2,
                    order: 2,
                    candidates: vec![candidate("dave"), candidate("erin"), candidate("frank")],
                },
            ],
        }
    }

    fn published(n: usize, chair: &str, committee: &[&str]) -> PublishedVote {
        publish(
            n,
            vec![
                PositionVote {
                    position_id: 1,
                    candidate_ids: vec![chair.to_string()],
                    abstain: false,
                },
                PositionVote {
                    position_id: 2,
                    candidate_ids: committee.iter().map(|c| c.to_string()).collect(),
                    abstain: committee.is_empty(),
                },
            ],
        )
    }

    /// A published vote with a consistent receipt for arbitrary content.
    fn publish(n: usize, content: Vec<PositionVote>) -> PublishedVote {
        let seal = format!("seal-{n}");
        let receipt_hash = receipt_hash(&content, &seal);
        PublishedVote {
            verification_code: verification_code(&receipt_hash),
            receipt_hash,
            content,
            seal,
            cast_at: Utc::now(),
        }
    }

    fn dump() -> ResultsDump {
        let catalog = catalog();
        let votes = vec![
            published(1, "alice", &["dave", "erin"]),
            published(2, "alice", &["erin"]),
            published(3, "bob", &[]),
        ];
        let mut tally = Tally::new(&catalog);
        for vote in &votes {
            tally.add(&vote.receipt_hash, &vote.content).unwrap();
        }
        let results = tally.finish(7, true, 4);
        ResultsDump {
            catalog,
            eligible_voters: 4,
            votes,
            results,
        }
    }

    /// Write a dump to a scratch file unique to the calling test.
    fn write_dump(name: &str, contents: &str) -> PathBuf {
        let path = std::env::temp_dir().join(format!(
            "verify-results-{}-{name}.json",
            std::process::id()
        ));
        std::fs::write(&path, contents).unwrap();
        path
    }

    #[test]
    fn verification() {
        // This test enters backend code, so enable logging.
        log4rs_test_utils::test_logging::init_logging_once_for(["ballot_backend"], None, None);

        let good = dump();
        let results = verify_dump(&good).unwrap();
        assert_eq!(results.total_votes, 3);
        assert_eq!(results.position_results[0].winner.as_deref(), Some("alice"));
        assert_eq!(results.position_results[1].abstained_votes, 1);
        assert_eq!(results.position_results[1].total_votes, 3);

        let mut tampered = dump();
        tampered.votes[1].content[0].candidate_ids = vec!["bob".to_string()];
        assert_eq!(
            verify_dump(&tampered),
            Err(VerificationError::Receipt {
                verification_code: tampered.votes[1].verification_code.clone()
            })
        );

        let mut duplicated = dump();
        duplicated.votes.push(duplicated.votes[0].clone());
        assert_eq!(
            verify_dump(&duplicated),
            Err(VerificationError::DuplicateReceipt {
                verification_code: duplicated.votes[0].verification_code.clone()
            })
        );

        let mut stranger = dump();
        stranger.votes.push(published(4, "mallory", &["dave"]));
        assert_eq!(
            verify_dump(&stranger),
            Err(VerificationError::InvalidVote {
                verification_code: stranger.votes[3].verification_code.clone()
            })
        );

        // An overvote with a consistent receipt is still refused.
        let mut overvote = dump();
        overvote.votes.push(publish(
            5,
            vec![
                PositionVote {
                    position_id: 1,
                    candidate_ids: vec!["alice".to_string(), "alice".to_string()],
                    abstain: false,
                },
                PositionVote {
                    position_id: 2,
                    candidate_ids: vec!["dave".to_string()],
                    abstain: false,
                },
            ],
        ));
        assert_eq!(
            verify_dump(&overvote),
            Err(VerificationError::InvalidVote {
                verification_code: overvote.votes[3].verification_code.clone()
            })
        );

        let mut inflated = dump();
        inflated.results.position_results[1].results[0].vote_count += 1;
        assert_eq!(
            verify_dump(&inflated),
            Err(VerificationError::Tally { position_id: 2 })
        );

        let mut turnout = dump();
        turnout.results.total_eligible_voters = 3;
        assert_eq!(verify_dump(&turnout), Err(VerificationError::Totals));
    }

    #[test]
    fn correct_cli_usage() {
        let good = write_dump("good", &serde_json::to_string(&dump()).unwrap());
        let command_line = [PROGRAM_NAME, good.to_str().unwrap()];
        let args = cli().try_get_matches_from(command_line).unwrap();
        assert_eq!(run(&args), 0);

        let mut wrong = dump();
        wrong.results.position_results[0].winner = Some("bob".to_string());
        let wrong = write_dump("wrong", &serde_json::to_string(&wrong).unwrap());
        let command_line = [PROGRAM_NAME, wrong.to_str().unwrap()];
        let args = cli().try_get_matches_from(command_line).unwrap();
        assert_eq!(run(&args), 255);

        let malformed = write_dump("malformed", "{\"catalog\": ");
        let command_line = [PROGRAM_NAME, malformed.to_str().unwrap()];
        let args = cli().try_get_matches_from(command_line).unwrap();
        assert_eq!(run(&args), 1);

        let command_line = [PROGRAM_NAME, "not a real file"];
        let args = cli().try_get_matches_from(command_line).unwrap();
        assert_eq!(run(&args), 1);

        for path in [good, wrong, malformed] {
            std::fs::remove_file(path).unwrap();
        }
    }

    #[test]
    fn bad_cli_usage() {
        // Something very wrong.
        let command_line = [PROGRAM_NAME, "this", "invocation", "is", "incorrect"];
        cli().try_get_matches_from(command_line).unwrap_err();

        // No options at all.
        let command_line = [PROGRAM_NAME];
        cli().try_get_matches_from(command_line).unwrap_err();
    }
}
