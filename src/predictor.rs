//! Resolution-risk predictor.
//!
//! A single-feature model: for each urgency it counts how many historical
//! escalations ended Pending vs Resolved and predicts the majority. Ties go
//! to Pending. An urgency never seen in training falls back to the overall
//! majority. The same history always produces the same model.
//!
//! Training runs at startup or on demand, never on the ingest path.

use std::collections::BTreeMap;
use std::fs::File;
use std::io::{BufReader, Read};
use std::path::Path;

use parking_lot::RwLock;
use serde::Serialize;

use crate::db::StoreError;
use crate::store::EscalationStore;
use crate::types::{EscalationStatus, Urgency};

#[derive(Debug, thiserror::Error)]
pub enum PredictorError {
    #[error("Training data not found: {0}")]
    FileNotFound(String),
    #[error("Failed to open training data: {0}")]
    Io(#[from] std::io::Error),
    #[error("Invalid training CSV: {0}")]
    Csv(#[from] csv::Error),
    #[error("Training CSV has no '{0}' column")]
    MissingColumn(&'static str),
    #[error("Failed to read history: {0}")]
    Store(#[from] StoreError),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", content = "status", rename_all = "camelCase")]
pub enum Prediction {
    Status(EscalationStatus),
    Unknown,
}

impl std::fmt::Display for Prediction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Prediction::Status(status) => write!(f, "{status}"),
            Prediction::Unknown => f.write_str("Unknown"),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
struct Tally {
    pending: usize,
    resolved: usize,
}

impl Tally {
    fn add(&mut self, status: EscalationStatus) {
        match status {
            EscalationStatus::Pending => self.pending += 1,
            EscalationStatus::Resolved => self.resolved += 1,
        }
    }

    fn majority(&self) -> Option<EscalationStatus> {
        if self.pending == 0 && self.resolved == 0 {
            None
        } else if self.resolved > self.pending {
            Some(EscalationStatus::Resolved)
        } else {
            Some(EscalationStatus::Pending)
        }
    }
}

/// Trained frequency table.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RiskModel {
    by_urgency: BTreeMap<Urgency, Tally>,
    overall: Tally,
}

impl RiskModel {
    pub fn train<I>(history: I) -> Self
    where
        I: IntoIterator<Item = (Urgency, EscalationStatus)>,
    {
        let mut model = Self::default();
        for (urgency, status) in history {
            model.by_urgency.entry(urgency).or_default().add(status);
            model.overall.add(status);
        }
        model
    }

    pub fn samples(&self) -> usize {
        self.overall.pending + self.overall.resolved
    }

    pub fn is_empty(&self) -> bool {
        self.samples() == 0
    }

    pub fn predict(&self, urgency: Urgency) -> Prediction {
        self.by_urgency
            .get(&urgency)
            .and_then(Tally::majority)
            .or_else(|| self.overall.majority())
            .map(Prediction::Status)
            .unwrap_or(Prediction::Unknown)
    }
}

/// Application-scoped holder for the current model.
#[derive(Default)]
pub struct RiskPredictor {
    model: RwLock<Option<RiskModel>>,
}

impl RiskPredictor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_trained(&self) -> bool {
        self.model.read().as_ref().is_some_and(|m| !m.is_empty())
    }

    /// Replace the model. Returns the number of training samples.
    pub fn train<I>(&self, history: I) -> usize
    where
        I: IntoIterator<Item = (Urgency, EscalationStatus)>,
    {
        let model = RiskModel::train(history);
        let samples = model.samples();
        *self.model.write() = Some(model);
        samples
    }

    /// Train on the store's history plus an optional CSV file.
    pub fn train_from_sources(
        &self,
        store: &dyn EscalationStore,
        csv_path: Option<&Path>,
    ) -> Result<usize, PredictorError> {
        let mut history: Vec<(Urgency, EscalationStatus)> = store
            .list_all()?
            .into_iter()
            .map(|e| (e.urgency, e.status))
            .collect();
        if let Some(path) = csv_path {
            history.extend(load_training_csv(path)?);
        }
        let samples = self.train(history);
        log::info!("Risk predictor trained on {} sample(s)", samples);
        Ok(samples)
    }

    pub fn predict(&self, urgency: Urgency) -> Prediction {
        match self.model.read().as_ref() {
            Some(model) => model.predict(urgency),
            None => Prediction::Unknown,
        }
    }

    /// Predict from a raw label such as "High". Unparsable labels are Unknown.
    pub fn predict_label(&self, urgency: &str) -> Prediction {
        match urgency.parse::<Urgency>() {
            Ok(u) => self.predict(u),
            Err(e) => {
                log::debug!("Cannot predict: {}", e);
                Prediction::Unknown
            }
        }
    }
}

/// Load `urgency,status` pairs from a CSV file with a header row.
pub fn load_training_csv(path: &Path) -> Result<Vec<(Urgency, EscalationStatus)>, PredictorError> {
    if !path.exists() {
        return Err(PredictorError::FileNotFound(path.display().to_string()));
    }
    let file = File::open(path)?;
    read_training_csv(BufReader::new(file))
}

pub(crate) fn read_training_csv<R: Read>(
    reader: R,
) -> Result<Vec<(Urgency, EscalationStatus)>, PredictorError> {
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(true)
        .trim(csv::Trim::All)
        .flexible(true)
        .from_reader(reader);

    let headers = reader.headers()?.clone();
    let column = |name: &'static str| {
        headers
            .iter()
            .position(|h| h.eq_ignore_ascii_case(name))
            .ok_or(PredictorError::MissingColumn(name))
    };
    let urgency_col = column("urgency")?;
    let status_col = column("status")?;

    let mut rows = Vec::new();
    let mut skipped = 0usize;
    for record in reader.records() {
        let record = record?;
        let urgency = record.get(urgency_col).and_then(|v| v.parse::<Urgency>().ok());
        let status = record
            .get(status_col)
            .and_then(|v| v.parse::<EscalationStatus>().ok());
        match (urgency, status) {
            (Some(u), Some(s)) => rows.push((u, s)),
            _ => skipped += 1,
        }
    }
    if skipped > 0 {
        log::warn!("Skipped {} training row(s) with unknown urgency or status", skipped);
    }
    Ok(rows)
}
