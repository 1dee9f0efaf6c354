use std::io::Write;

use async_trait::async_trait;
use relay_utils::{Batch, BoxError, Record};

use super::traits::Outlet;
use crate::link::Update;

/// Outlet that writes every record to standard output.
#[derive(Debug, Clone, Default)]
pub struct PrintOutlet {
    only_payload: bool,
    skip_update: bool,
}

impl PrintOutlet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Print the payload instead of the whole record.
    pub fn only_payload(mut self, only_payload: bool) -> Self {
        self.only_payload = only_payload;
        self
    }

    /// Leave out the update prefix.
    pub fn skip_update(mut self, skip_update: bool) -> Self {
        self.skip_update = skip_update;
        self
    }

    fn line(&self, record: &Record, update: &Update) -> String {
        let body = if self.only_payload {
            record.payload().to_string()
        } else {
            record.to_string()
        };
        if self.skip_update {
            body
        } else {
            format!("{update} {body}")
        }
    }
}

#[async_trait]
impl Outlet for PrintOutlet {
    fn name(&self) -> &str {
        "print"
    }

    async fn push(&self, records: Batch, update: &Update) -> Result<(), BoxError> {
        let stdout = std::io::stdout();
        let mut out = stdout.lock();
        for record in records.iter() {
            writeln!(out, "{}", self.line(record, update))?;
        }
        out.flush()?;
        Ok(())
    }
}
