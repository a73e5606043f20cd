//! CSV dataset loading and candidate file writing
//!
//! Rows that fail validation are skipped with a warning (`MalformedRecord`);
//! a missing file or a header without the required columns is fatal.

use std::collections::HashMap;
use std::fs;
use std::path::Path;

use anyhow::{anyhow, Context, Result};
use csv::{ReaderBuilder, StringRecord};
use serde::{Deserialize, Serialize};

use crate::corpus::{Document, Qrel, Query};
use crate::error::RefineError;
use crate::retrieval::fusion::Candidate;
use crate::text::remove_html;

const DOC_ID_COLUMNS: &[&str] = &["KEY", "ID", "DOC_ID"];
const DOC_TEXT_COLUMNS: &[&str] = &["ENUNCIADO", "TEXT"];
const QUERY_ID_COLUMNS: &[&str] = &["ID", "QUERY_ID"];
const QUERY_TEXT_COLUMNS: &[&str] = &["TEXT", "QUERY"];
const INTENT_COLUMNS: &[&str] = &["INTENCAO", "INTENT"];

/// Records accepted from a file plus the count of rows that were skipped
#[derive(Debug, Clone)]
pub struct LoadReport<T> {
    pub records: Vec<T>,
    pub skipped: usize,
}

impl<T> LoadReport<T> {
    fn new() -> Self {
        Self {
            records: Vec::new(),
            skipped: 0,
        }
    }

    fn skip(&mut self, err: RefineError) {
        tracing::warn!(error = %err, "Skipping malformed record");
        self.skipped += 1;
    }
}

/// One row of a candidate file
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub struct CandidateRow {
    pub query_id: String,
    pub doc_id: String,
    pub rank: usize,
    pub lexical_score: f32,
    pub semantic_score: f32,
    pub fused_score: f32,
    pub rerank_score: Option<f32>,
}

/// One row of a chat-refined candidate file
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub struct ChatCandidateRow {
    pub query_id: String,
    pub doc_id: String,
    pub rank: usize,
    pub lexical_score: f32,
    pub semantic_score: f32,
    pub fused_score: f32,
    pub rerank_score: Option<f32>,
    pub turns_used: usize,
}

impl From<&Candidate> for CandidateRow {
    fn from(c: &Candidate) -> Self {
        Self {
            query_id: c.query_id.clone(),
            doc_id: c.doc_id.clone(),
            rank: c.rank,
            lexical_score: c.lexical_score,
            semantic_score: c.semantic_score,
            fused_score: c.fused_score,
            rerank_score: c.rerank_score,
        }
    }
}

impl ChatCandidateRow {
    pub fn new(c: &Candidate, turns_used: usize) -> Self {
        Self {
            query_id: c.query_id.clone(),
            doc_id: c.doc_id.clone(),
            rank: c.rank,
            lexical_score: c.lexical_score,
            semantic_score: c.semantic_score,
            fused_score: c.fused_score,
            rerank_score: c.rerank_score,
            turns_used,
        }
    }
}

/// Minimal view of any candidate file, used by evaluation
#[derive(Debug, Clone, PartialEq)]
pub struct RankedRow {
    pub query_id: String,
    pub doc_id: String,
    pub rank: usize,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub struct IntentRow {
    pub id: String,
    pub text: String,
    pub intencao: String,
}

pub fn load_documents(path: &Path) -> Result<LoadReport<Document>> {
    let (headers, mut reader) = open(path)?;
    let id_col = require_column(&headers, DOC_ID_COLUMNS, path)?;
    let text_col = require_column(&headers, DOC_TEXT_COLUMNS, path)?;

    let mut report = LoadReport::new();
    for row in reader.records() {
        let record = match row {
            Ok(record) => record,
            Err(err) => {
                report.skip(malformed("document", line_of_error(&err), err.to_string()));
                continue;
            }
        };
        let line = line_of(&record);

        let id = field(&record, id_col);
        if id.is_empty() {
            report.skip(malformed("document", line, "empty id"));
            continue;
        }
        let text = remove_html(field(&record, text_col));
        if text.is_empty() {
            report.skip(malformed("document", line, format!("empty text for {id}")));
            continue;
        }

        let mut doc = Document::new(id, text);
        for (idx, name) in headers.iter().enumerate() {
            if idx == id_col || idx == text_col {
                continue;
            }
            let value = field(&record, idx);
            if !value.is_empty() {
                doc.metadata.insert(name.trim().to_string(), value.to_string());
            }
        }
        report.records.push(doc);
    }

    Ok(report)
}

pub fn load_queries(path: &Path) -> Result<LoadReport<Query>> {
    let (headers, mut reader) = open(path)?;
    let id_col = require_column(&headers, QUERY_ID_COLUMNS, path)?;
    let text_col = require_column(&headers, QUERY_TEXT_COLUMNS, path)?;
    let intent_col = find_column(&headers, INTENT_COLUMNS);

    let mut report = LoadReport::new();
    for row in reader.records() {
        let record = match row {
            Ok(record) => record,
            Err(err) => {
                report.skip(malformed("query", line_of_error(&err), err.to_string()));
                continue;
            }
        };
        let line = line_of(&record);

        let id = field(&record, id_col);
        let text = field(&record, text_col);
        if id.is_empty() || text.is_empty() {
            report.skip(malformed("query", line, "empty id or text"));
            continue;
        }

        let mut query = Query::new(id, text);
        if let Some(col) = intent_col {
            if let Some(intent) = clean_intent(field(&record, col)) {
                query.intent = Some(intent);
            }
        }
        report.records.push(query);
    }

    Ok(report)
}

/// Query id → intent. Blank and `nan` values are treated as absent.
pub fn load_intents(path: &Path) -> Result<HashMap<String, String>> {
    let (headers, mut reader) = open(path)?;
    let id_col = require_column(&headers, QUERY_ID_COLUMNS, path)?;
    let intent_col = require_column(&headers, INTENT_COLUMNS, path)?;

    let mut out = HashMap::new();
    for row in reader.records() {
        let record = match row {
            Ok(record) => record,
            Err(err) => {
                tracing::warn!(
                    error = %malformed("intent", line_of_error(&err), err.to_string()),
                    "Skipping malformed record"
                );
                continue;
            }
        };
        let id = field(&record, id_col);
        if id.is_empty() {
            continue;
        }
        if let Some(intent) = clean_intent(field(&record, intent_col)) {
            out.insert(id.to_string(), intent);
        }
    }
    Ok(out)
}

pub fn load_qrels(path: &Path) -> Result<LoadReport<Qrel>> {
    let (headers, mut reader) = open(path)?;
    let query_col = require_column(&headers, &["QUERY_ID"], path)?;
    let doc_col = require_column(&headers, &["DOC_ID"], path)?;
    let score_col = require_column(&headers, &["SCORE"], path)?;
    let rank_col = find_column(&headers, &["RANK"]);

    let mut report = LoadReport::new();
    for row in reader.records() {
        let record = match row {
            Ok(record) => record,
            Err(err) => {
                report.skip(malformed("qrel", line_of_error(&err), err.to_string()));
                continue;
            }
        };
        let line = line_of(&record);

        let query_id = field(&record, query_col);
        let doc_id = field(&record, doc_col);
        let Some(score) = parse_grade(field(&record, score_col)) else {
            report.skip(malformed("qrel", line, "unparseable SCORE"));
            continue;
        };
        if query_id.is_empty() || doc_id.is_empty() {
            report.skip(malformed("qrel", line, "empty QUERY_ID or DOC_ID"));
            continue;
        }

        report.records.push(Qrel {
            query_id: query_id.to_string(),
            doc_id: doc_id.to_string(),
            score,
            rank: rank_col.and_then(|col| field(&record, col).parse::<u32>().ok()),
        });
    }

    Ok(report)
}

/// Read `QUERY_ID, DOC_ID, RANK` from any candidate file
pub fn load_ranked_rows(path: &Path) -> Result<LoadReport<RankedRow>> {
    let (headers, mut reader) = open(path)?;
    let query_col = require_column(&headers, &["QUERY_ID"], path)?;
    let doc_col = require_column(&headers, &["DOC_ID"], path)?;
    let rank_col = require_column(&headers, &["RANK"], path)?;

    let mut report = LoadReport::new();
    for row in reader.records() {
        let record = match row {
            Ok(record) => record,
            Err(err) => {
                report.skip(malformed("candidate", line_of_error(&err), err.to_string()));
                continue;
            }
        };
        let line = line_of(&record);
        let Ok(rank) = field(&record, rank_col).parse::<usize>() else {
            report.skip(malformed("candidate", line, "unparseable RANK"));
            continue;
        };
        report.records.push(RankedRow {
            query_id: field(&record, query_col).to_string(),
            doc_id: field(&record, doc_col).to_string(),
            rank,
        });
    }
    Ok(report)
}

/// Externally supplied answers keyed by `(query id, turn index)`
pub fn load_answers(path: &Path) -> Result<HashMap<(String, usize), String>> {
    let (headers, mut reader) = open(path)?;
    let query_col = require_column(&headers, &["QUERY_ID"], path)?;
    let turn_col = require_column(&headers, &["TURN"], path)?;
    let answer_col = require_column(&headers, &["ANSWER"], path)?;

    let mut out = HashMap::new();
    for row in reader.records() {
        let record = match row {
            Ok(record) => record,
            Err(err) => {
                tracing::warn!(
                    error = %malformed("answer", line_of_error(&err), err.to_string()),
                    "Skipping malformed record"
                );
                continue;
            }
        };
        let Ok(turn) = field(&record, turn_col).parse::<usize>() else {
            tracing::warn!(
                error = %malformed("answer", line_of(&record), "unparseable TURN"),
                "Skipping malformed record"
            );
            continue;
        };
        let answer = field(&record, answer_col);
        if !answer.is_empty() {
            out.insert(
                (field(&record, query_col).to_string(), turn),
                answer.to_string(),
            );
        }
    }
    Ok(out)
}

/// Serialize rows to `path`, replacing any previous file only once the new
/// content is complete.
pub fn write_rows<T: Serialize>(path: &Path, rows: &[T]) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create directory: {}", parent.display()))?;
    }

    let tmp = path.with_extension("csv.tmp");
    {
        let mut writer = csv::Writer::from_path(&tmp)
            .with_context(|| format!("Failed to create {}", tmp.display()))?;
        for row in rows {
            writer
                .serialize(row)
                .with_context(|| format!("Failed to write row to {}", tmp.display()))?;
        }
        writer
            .flush()
            .with_context(|| format!("Failed to flush {}", tmp.display()))?;
    }
    fs::rename(&tmp, path)
        .with_context(|| format!("Failed to move {} into place", path.display()))?;
    Ok(())
}

fn open(path: &Path) -> Result<(StringRecord, csv::Reader<fs::File>)> {
    let mut reader = ReaderBuilder::new()
        .flexible(true)
        .trim(csv::Trim::All)
        .from_path(path)
        .with_context(|| format!("Failed to open {}", path.display()))?;
    let headers = reader
        .headers()
        .with_context(|| format!("Failed to read header of {}", path.display()))?
        .clone();
    Ok((headers, reader))
}

fn find_column(headers: &StringRecord, aliases: &[&str]) -> Option<usize> {
    aliases.iter().find_map(|alias| {
        headers
            .iter()
            .position(|h| h.trim().eq_ignore_ascii_case(alias))
    })
}

fn require_column(headers: &StringRecord, aliases: &[&str], path: &Path) -> Result<usize> {
    find_column(headers, aliases).ok_or_else(|| {
        anyhow!(
            "{} has no {} column",
            path.display(),
            aliases.join("/")
        )
    })
}

fn field(record: &StringRecord, idx: usize) -> &str {
    record.get(idx).map(str::trim).unwrap_or("")
}

fn line_of(record: &StringRecord) -> u64 {
    record.position().map(|p| p.line()).unwrap_or(0)
}

fn line_of_error(err: &csv::Error) -> u64 {
    err.position().map(|p| p.line()).unwrap_or(0)
}

fn malformed(kind: &'static str, line: u64, reason: impl Into<String>) -> RefineError {
    RefineError::MalformedRecord {
        kind,
        line,
        reason: reason.into(),
    }
}

fn clean_intent(raw: &str) -> Option<String> {
    let value = raw.trim();
    if value.is_empty() || value.eq_ignore_ascii_case("nan") {
        None
    } else {
        Some(value.to_string())
    }
}

fn parse_grade(raw: &str) -> Option<i32> {
    raw.parse::<i32>()
        .ok()
        .or_else(|| raw.parse::<f64>().ok().map(|v| v.round() as i32))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn write_file(dir: &Path, name: &str, content: &str) -> std::path::PathBuf {
        let path = dir.join(name);
        let mut file = fs::File::create(&path).unwrap();
        file.write_all(content.as_bytes()).unwrap();
        path
    }

    #[test]
    fn documents_skip_bad_rows_and_keep_metadata() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_file(
            dir.path(),
            "doc.csv",
            "KEY,ENUNCIADO,EXCERTO\n\
             J-1,<p>Prazo recursal</p>,Excerto um\n\
             ,sem id,x\n\
             J-3,<br/>,vazio\n\
             J-4,Competência,\n",
        );

        let report = load_documents(&path).unwrap();
        assert_eq!(report.skipped, 2);
        assert_eq!(report.records.len(), 2);
        assert_eq!(report.records[0].id, "J-1");
        assert_eq!(report.records[0].text, "Prazo recursal");
        assert_eq!(
            report.records[0].metadata.get("EXCERTO").map(String::as_str),
            Some("Excerto um")
        );
        assert!(report.records[1].metadata.is_empty());
    }

    #[test]
    fn documents_require_id_and_text_columns() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_file(dir.path(), "doc.csv", "FOO,BAR\n1,2\n");
        let err = load_documents(&path).unwrap_err().to_string();
        assert!(err.contains("KEY/ID/DOC_ID"));
    }

    #[test]
    fn missing_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        assert!(load_queries(&dir.path().join("nope.csv")).is_err());
    }

    #[test]
    fn intents_ignore_blank_and_nan() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_file(
            dir.path(),
            "query_intencao.csv",
            "ID,TEXT,INTENCAO\n1,a,Busca sobre prazos\n2,b,nan\n3,c,\n",
        );
        let intents = load_intents(&path).unwrap();
        assert_eq!(intents.len(), 1);
        assert_eq!(intents["1"], "Busca sobre prazos");
    }

    #[test]
    fn qrels_accept_float_grades() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_file(
            dir.path(),
            "qrel.csv",
            "QUERY_ID,DOC_ID,SCORE,RANK\n1,85434,3.0,1\n1,85435,x,2\n",
        );
        let report = load_qrels(&path).unwrap();
        assert_eq!(report.skipped, 1);
        assert_eq!(report.records[0].score, 3);
        assert_eq!(report.records[0].rank, Some(1));
    }

    #[test]
    fn answers_skip_unreadable_rows() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("answers.csv");
        let mut content = b"QUERY_ID,TURN,ANSWER\n1,0,30 dias\n2,0,".to_vec();
        content.extend_from_slice(&[0xff, 0xfe]);
        content.extend_from_slice(b"\n3,x,sem turno\n4,1,o tribunal regional\n");
        fs::write(&path, content).unwrap();

        let answers = load_answers(&path).unwrap();
        assert_eq!(answers.len(), 2);
        assert_eq!(answers[&("1".to_string(), 0)], "30 dias");
        assert_eq!(answers[&("4".to_string(), 1)], "o tribunal regional");
    }

    #[test]
    fn write_rows_round_trips_candidate_files() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out").join("candidates.csv");
        let rows = vec![CandidateRow {
            query_id: "1".to_string(),
            doc_id: "D1".to_string(),
            rank: 1,
            lexical_score: 1.5,
            semantic_score: 0.25,
            fused_score: 1.0,
            rerank_score: None,
        }];

        write_rows(&path, &rows).unwrap();
        let content = fs::read_to_string(&path).unwrap();
        assert!(content.starts_with(
            "QUERY_ID,DOC_ID,RANK,LEXICAL_SCORE,SEMANTIC_SCORE,FUSED_SCORE,RERANK_SCORE\n"
        ));

        let ranked = load_ranked_rows(&path).unwrap();
        assert_eq!(ranked.records.len(), 1);
        assert_eq!(ranked.records[0].rank, 1);
        assert!(!path.with_extension("csv.tmp").exists());
    }
}
