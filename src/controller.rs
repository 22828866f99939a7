use std::sync::Arc;
use std::time::{Duration, Instant};

use eyre::{Context, ContextCompat, Result};
use nl2sql_driver::{Generate, GenerationParams, Message};
use rand::Rng;
use tracing::{info, instrument};

use crate::catalog;
use crate::format::{self, Line, SqlCheck, SqlFormatter};
use crate::session::Session;

/// Outcome of one "Generate SQL" action. Rendered once, never stored.
#[derive(Debug, Clone)]
pub struct Rendered {
    pub question: String,
    pub generated_text: String,
    pub sql: String,
    pub lines: Vec<Line>,
    pub check: SqlCheck,
    pub elapsed: Duration,
}

/// The two user actions, independent of how they are triggered.
pub struct Controller {
    generator: Arc<dyn Generate>,
    formatter: SqlFormatter,
    params: GenerationParams,
}

impl Controller {
    pub fn new(generator: Arc<dyn Generate>, params: GenerationParams) -> Self {
        Self {
            generator,
            formatter: SqlFormatter::default(),
            params,
        }
    }

    /// Overwrite the session's question with a catalog pick.
    pub fn insert_random_question<R: Rng + ?Sized>(
        &self,
        session: &mut Session,
        rng: &mut R,
    ) -> &'static str {
        let question = catalog::pick(rng);
        session.fill_random(question);

        question
    }

    /// Ask the model for SQL. Blocks until the model answers. The question
    /// is not validated: empty input is sent as-is.
    #[instrument(skip(self), fields(len = question.len()))]
    pub fn generate_sql(&self, question: &str) -> Result<Rendered> {
        let start = Instant::now();

        let output = self
            .generator
            .generate(&[Message::user(question)], &self.params)
            .wrap_err("generation failed")?;

        let generated_text = output
            .into_iter()
            .next()
            .map(|g| g.generated_text)
            .wrap_err("the model returned no result")?;

        let sql = self.formatter.format(&generated_text);
        let check = format::check(&sql);
        let lines = format::highlight(&sql);
        let elapsed = start.elapsed();

        info!(
            elapsed = ?elapsed,
            valid = check.is_valid(),
            lines = lines.len(),
            "sql generated"
        );

        Ok(Rendered {
            question: question.to_string(),
            generated_text,
            sql,
            lines,
            check,
            elapsed,
        })
    }
}
