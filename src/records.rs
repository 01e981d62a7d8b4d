//! Upstream record shapes and their conversion into matches.
//!
//! Crowdsourced judgments arrive as task records (which two items a task
//! shows) and answer records (which side the worker picked). Recorded
//! model comparisons arrive as flat `a,b,score` lines.

use std::collections::{BTreeMap, BTreeSet};
use std::str::FromStr;

use crate::rating::{Match, Outcome, RatingState};
use crate::EloError;

#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct TaskRecord {
    #[cfg_attr(feature = "serde", serde(deserialize_with = "id_from_number_or_string"))]
    pub experiment_id: u64,
    #[cfg_attr(feature = "serde", serde(deserialize_with = "text_from_number_or_string"))]
    pub tweet1: String,
    #[cfg_attr(feature = "serde", serde(deserialize_with = "text_from_number_or_string"))]
    pub tweet2: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct AnswerEntry {
    pub selection: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct AnswerRecord {
    #[cfg_attr(feature = "serde", serde(deserialize_with = "id_from_number_or_string"))]
    pub task: u64,
    pub answer: Vec<AnswerEntry>,
}

#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct TruthRecord {
    #[cfg_attr(feature = "serde", serde(deserialize_with = "text_from_number_or_string"))]
    pub conversation: String,
    pub rating: f64,
    pub ranking: usize,
}

#[cfg(feature = "serde")]
#[derive(serde::Deserialize)]
#[serde(untagged)]
enum RawId {
    Unsigned(u64),
    Signed(i64),
    Text(String),
}

#[cfg(feature = "serde")]
fn id_from_number_or_string<'de, D>(deserializer: D) -> Result<u64, D::Error>
where
    D: serde::Deserializer<'de>,
{
    use serde::de::Error;
    use serde::Deserialize;

    match RawId::deserialize(deserializer)? {
        RawId::Unsigned(id) => Ok(id),
        RawId::Signed(id) => Err(D::Error::custom(format!("negative id {id}"))),
        RawId::Text(text) => text.trim().parse().map_err(D::Error::custom),
    }
}

#[cfg(feature = "serde")]
fn text_from_number_or_string<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: serde::Deserializer<'de>,
{
    use serde::Deserialize;

    Ok(match RawId::deserialize(deserializer)? {
        RawId::Unsigned(id) => id.to_string(),
        RawId::Signed(id) => id.to_string(),
        RawId::Text(text) => text,
    })
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Selection {
    Left,
    Right,
    Equal,
}

impl FromStr for Selection {
    type Err = EloError<String>;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "left" => Ok(Selection::Left),
            "right" => Ok(Selection::Right),
            "equal" => Ok(Selection::Equal),
            other => Err(EloError::InvalidSelection(other.to_string())),
        }
    }
}

impl Selection {
    pub fn outcome(self) -> Outcome {
        match self {
            Selection::Left => Outcome::Win,
            Selection::Right => Outcome::Lose,
            Selection::Equal => Outcome::Tie,
        }
    }
}

/// Match for one answered task; only the first answer entry counts.
pub fn make_match(task: &TaskRecord, answer: &AnswerRecord) -> Result<Match<String>, EloError<String>> {
    let entry = answer.answer.first().ok_or_else(|| {
        EloError::MalformedRecord(format!("answer for task {} has no selection", answer.task))
    })?;
    let selection: Selection = entry.selection.parse()?;
    let (score_a, _) = selection.outcome().scores();
    Match::new(task.tweet1.clone(), task.tweet2.clone(), score_a)
}

pub fn task_items(tasks: &[TaskRecord]) -> BTreeSet<String> {
    tasks
        .iter()
        .flat_map(|task| [task.tweet1.clone(), task.tweet2.clone()])
        .collect()
}

/// Joins answers to their tasks, keeping matches whose two items are both
/// in `keep`. An answer naming an unknown task is malformed input.
pub fn join_judgments(
    tasks: &[TaskRecord],
    answers: &[AnswerRecord],
    keep: &BTreeSet<String>,
) -> Result<Vec<Match<String>>, EloError<String>> {
    let by_id: BTreeMap<u64, &TaskRecord> = tasks.iter().map(|task| (task.experiment_id, task)).collect();

    let mut matches = Vec::new();
    for answer in answers {
        let task = by_id
            .get(&answer.task)
            .ok_or_else(|| EloError::MalformedRecord(format!("answer refers to unknown task {}", answer.task)))?;
        if keep.contains(&task.tweet1) && keep.contains(&task.tweet2) {
            matches.push(make_match(task, answer)?);
        }
    }
    Ok(matches)
}

/// Ground-truth ratings for the items in `keep`.
pub fn truth_ratings(records: &[TruthRecord], keep: &BTreeSet<String>) -> RatingState<String> {
    RatingState::from_ratings(
        records
            .iter()
            .filter(|record| keep.contains(&record.conversation))
            .map(|record| (record.conversation.clone(), record.rating))
            .collect(),
    )
}

/// Parses `itemA,itemB,score`, where `score` is the probability that A beat B.
pub fn parse_comparison_line(line: &str) -> Result<Match<String>, EloError<String>> {
    let fields: Vec<&str> = line.trim().split(',').collect();
    let [a, b, score] = fields.as_slice() else {
        return Err(EloError::MalformedRecord(format!(
            "expected 3 comma-separated fields, got {}: {line:?}",
            fields.len()
        )));
    };
    let score: f64 = score
        .trim()
        .parse()
        .map_err(|e| EloError::MalformedRecord(format!("bad score {score:?}: {e}")))?;
    Match::new(a.trim().to_string(), b.trim().to_string(), score)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn task(id: u64, left: &str, right: &str) -> TaskRecord {
        TaskRecord {
            experiment_id: id,
            tweet1: left.to_string(),
            tweet2: right.to_string(),
        }
    }

    fn answer(task: u64, selection: &str) -> AnswerRecord {
        AnswerRecord {
            task,
            answer: vec![AnswerEntry {
                selection: selection.to_string(),
            }],
        }
    }

    #[test]
    fn test_selections_map_to_outcomes() {
        let t = task(1, "a", "b");

        let left = make_match(&t, &answer(1, "left")).unwrap();
        assert_eq!((left.score_a(), left.score_b()), (1.0, 0.0));
        let right = make_match(&t, &answer(1, "right")).unwrap();
        assert_eq!((right.score_a(), right.score_b()), (0.0, 1.0));
        let equal = make_match(&t, &answer(1, "equal")).unwrap();
        assert_eq!((equal.score_a(), equal.score_b()), (0.5, 0.5));
        assert_eq!(equal.player_a(), "a");
    }

    #[test]
    fn test_unknown_selection_is_an_error() {
        let err = make_match(&task(1, "a", "b"), &answer(1, "both")).unwrap_err();
        assert!(matches!(err, EloError::InvalidSelection(ref s) if s == "both"));

        let empty = AnswerRecord { task: 1, answer: vec![] };
        assert!(matches!(
            make_match(&task(1, "a", "b"), &empty),
            Err(EloError::MalformedRecord(_))
        ));
    }

    #[test]
    fn test_join_keeps_only_sampled_items() {
        let tasks = vec![task(1, "a", "b"), task(2, "b", "c"), task(3, "c", "a")];
        let answers = vec![answer(1, "left"), answer(2, "right"), answer(3, "equal"), answer(1, "right")];
        let keep: BTreeSet<String> = ["a", "b"].iter().map(|s| s.to_string()).collect();

        let matches = join_judgments(&tasks, &answers, &keep).unwrap();
        assert_eq!(matches.len(), 2);
        assert!(matches.iter().all(|m| m.player_a() == "a" && m.player_b() == "b"));
        assert_eq!(task_items(&tasks).len(), 3);

        let orphan = vec![answer(9, "left")];
        assert!(join_judgments(&tasks, &orphan, &keep).is_err());
    }

    #[test]
    fn test_parse_comparison_line() {
        let game = parse_comparison_line("x1, y2 ,0.75\n").unwrap();
        assert_eq!(game.player_a(), "x1");
        assert_eq!(game.player_b(), "y2");
        assert_eq!(game.score_b(), 0.25);

        assert!(matches!(parse_comparison_line("x,y"), Err(EloError::MalformedRecord(_))));
        assert!(matches!(parse_comparison_line("x,y,abc"), Err(EloError::MalformedRecord(_))));
        assert!(matches!(parse_comparison_line("x,y,1.5"), Err(EloError::InvalidScore(_))));
    }

    #[test]
    fn test_truth_ratings_filters_to_sample() {
        let records = vec![
            TruthRecord { conversation: "a".into(), rating: 1.0, ranking: 1 },
            TruthRecord { conversation: "z".into(), rating: 2.0, ranking: 0 },
        ];
        let keep: BTreeSet<String> = ["a".to_string()].into_iter().collect();
        let truth = truth_ratings(&records, &keep);
        assert_eq!(truth.len(), 1);
        assert_eq!(truth.get(&"a".to_string()).unwrap(), 1.0);
    }

    #[test]
    fn test_task_showing_one_item_twice_is_rejected() {
        let err = make_match(&task(1, "a", "a"), &answer(1, "left")).unwrap_err();
        assert!(matches!(err, EloError::InvalidComparison(ref s) if s == "a"));

        let keep: BTreeSet<String> = ["a".to_string()].into_iter().collect();
        assert!(join_judgments(&[task(1, "a", "a")], &[answer(1, "equal")], &keep).is_err());
        assert!(matches!(
            parse_comparison_line("x,x,0.7"),
            Err(EloError::InvalidComparison(_))
        ));
    }

    #[test]
    #[cfg(feature = "serde")]
    fn test_numeric_item_ids_deserialize_as_text() {
        let task: TaskRecord =
            serde_json::from_str(r#"{"experiment_id": 4, "tweet1": 1200, "tweet2": "1201"}"#).unwrap();
        assert_eq!((task.tweet1.as_str(), task.tweet2.as_str()), ("1200", "1201"));

        let truth: TruthRecord =
            serde_json::from_str(r#"{"conversation": 1200, "rating": 3.5, "ranking": 0}"#).unwrap();
        assert_eq!(truth.conversation, "1200");

        assert!(serde_json::from_str::<TaskRecord>(r#"{"experiment_id": -1, "tweet1": 1, "tweet2": 2}"#).is_err());
    }

    #[test]
    #[cfg(feature = "serde")]
    fn test_records_deserialize_from_json_lines() {
        let task: TaskRecord =
            serde_json::from_str(r#"{"experiment_id": "17", "tweet1": "a", "tweet2": "b"}"#).unwrap();
        assert_eq!(task.experiment_id, 17);

        let answer: AnswerRecord =
            serde_json::from_str(r#"{"task": 17, "answer": [{"selection": "equal"}]}"#).unwrap();
        let game = make_match(&task, &answer).unwrap();
        assert_eq!(game.score_a(), 0.5);
    }
}
