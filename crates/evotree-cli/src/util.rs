use std::{
    fs::File,
    io::{self, BufWriter, StdoutLock, Write as _},
    path::{Path, PathBuf},
};

use anyhow::Context;
use evotree_evaluator::Record;

use crate::model::EvaluatorModel;

#[derive(Debug)]
pub enum Output {
    Stdout {
        writer: StdoutLock<'static>,
    },
    File {
        writer: BufWriter<File>,
        path: PathBuf,
    },
}

impl Output {
    pub fn save_json<T>(value: &T, output_path: Option<PathBuf>) -> anyhow::Result<()>
    where
        T: serde::Serialize,
    {
        let mut output = Output::from_output_path(output_path)?;
        output.write_json(value)
    }

    pub fn from_output_path(output_path: Option<PathBuf>) -> anyhow::Result<Self> {
        match output_path {
            Some(path) => Output::open(path),
            None => Ok(Output::stdout()),
        }
    }

    pub fn stdout() -> Self {
        Output::Stdout {
            writer: io::stdout().lock(),
        }
    }

    pub fn open(path: PathBuf) -> anyhow::Result<Self> {
        let file = File::create(&path)
            .with_context(|| format!("Failed to create output file: {}", path.display()))?;
        Ok(Output::File {
            writer: BufWriter::new(file),
            path,
        })
    }

    pub fn display_path(&self) -> String {
        match self {
            Output::Stdout { .. } => "stdout".to_string(),
            Output::File { path, .. } => path.display().to_string(),
        }
    }

    pub fn write_json<T>(&mut self, value: T) -> anyhow::Result<()>
    where
        T: serde::Serialize,
    {
        serde_json::to_writer_pretty(&mut *self, &value)
            .with_context(|| format!("Failed to write JSON to {}", self.display_path()))?;
        writeln!(&mut *self).with_context(|| {
            format!(
                "Failed to write newline after JSON to {}",
                self.display_path()
            )
        })?;
        self.flush()
            .with_context(|| format!("Failed to flush output to {}", self.display_path()))?;
        Ok(())
    }
}

impl io::Write for Output {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        match self {
            Output::Stdout { writer } => writer.write(buf),
            Output::File { writer, .. } => writer.write(buf),
        }
    }

    fn flush(&mut self) -> io::Result<()> {
        match self {
            Output::Stdout { writer } => writer.flush(),
            Output::File { writer, .. } => writer.flush(),
        }
    }
}

pub fn read_json_file<T, P>(file_kind: &str, path: P) -> anyhow::Result<T>
where
    T: serde::de::DeserializeOwned,
    P: AsRef<Path>,
{
    let path = path.as_ref();
    let file = File::open(path)
        .with_context(|| format!("Failed to open {} file: {}", file_kind, path.display()))?;

    let reader = io::BufReader::new(file);
    let value = serde_json::from_reader(reader).with_context(|| {
        format!(
            "Failed to parse {} JSON file: {}",
            file_kind,
            path.display()
        )
    })?;

    Ok(value)
}

/// Read game records from a JSON file and check their consistency
///
/// # Returns
///
/// The records and the common input dimension of all their options
///
/// # Errors
///
/// Returns error if the file cannot be read, it holds no records, a record is
/// inconsistent, or records disagree on the input dimension
pub fn read_records_file<P>(path: P) -> anyhow::Result<(Vec<Record>, usize)>
where
    P: AsRef<Path>,
{
    let path = path.as_ref();
    let records: Vec<Record> = read_json_file("records", path)?;
    let Some(first) = records.first() else {
        anyhow::bail!("No records in {}", path.display());
    };
    let dim = first.options.first().map_or(0, |c| c.input.len());
    for (i, record) in records.iter().enumerate() {
        record
            .validate()
            .with_context(|| format!("Invalid record #{i} in {}", path.display()))?;
        let found = record.options[0].input.len();
        anyhow::ensure!(
            found == dim,
            "Record #{i} in {} has input dimension {found}, expected {dim}",
            path.display()
        );
    }
    Ok((records, dim))
}

/// Read a trained evaluator model from a JSON file
pub fn read_model_file<P>(path: P) -> anyhow::Result<EvaluatorModel>
where
    P: AsRef<Path>,
{
    read_json_file("model", path)
}
