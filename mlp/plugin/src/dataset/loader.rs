use std::{
    fs::File,
    io::{self, Read},
    path::{Path, PathBuf},
};

use csv::{ErrorKind as CsvErrorKind, ReaderBuilder};

use super::table::Dataset;
use crate::error::{PluginError, PluginResult};

/// Reads delimited files with a header row into a [`Dataset`].
#[derive(Debug, Clone, Copy)]
pub struct DatasetLoader {
    delimiter: u8,
}

impl Default for DatasetLoader {
    fn default() -> Self {
        Self::new(b',')
    }
}

impl DatasetLoader {
    /// Creates a loader for the given field delimiter.
    #[must_use]
    pub const fn new(delimiter: u8) -> Self {
        Self { delimiter }
    }

    /// Loads a file, mapping an unresolvable path to `NotFound`.
    pub fn load(&self, path: impl AsRef<Path>) -> PluginResult<Dataset> {
        let path = path.as_ref();
        if path.is_dir() {
            return Err(PluginError::parse(format!(
                "`{}` is a directory, not a data file",
                path.display()
            )));
        }
        let file = File::open(path).map_err(|err| match err.kind() {
            io::ErrorKind::NotFound => {
                PluginError::not_found(format!("data file `{}` does not exist", path.display()))
            }
            _ => PluginError::internal(format!("opening `{}`: {err}", path.display())),
        })?;
        self.from_reader(file)
            .map_err(|err| match err {
                PluginError::Parse(msg) => {
                    PluginError::parse(format!("{}: {msg}", path.display()))
                }
                other => other,
            })
    }

    /// Loads a file on the blocking pool so async callers only wait on I/O.
    pub async fn load_async(&self, path: PathBuf) -> PluginResult<Dataset> {
        let loader = *self;
        tokio::task::spawn_blocking(move || loader.load(path))
            .await
            .map_err(|err| PluginError::internal(format!("dataset load task failed: {err}")))?
    }

    /// Parses delimited text from any reader.
    pub fn from_reader<R: Read>(&self, reader: R) -> PluginResult<Dataset> {
        let mut reader = ReaderBuilder::new()
            .delimiter(self.delimiter)
            .has_headers(true)
            .flexible(false)
            .from_reader(reader);

        let headers = reader.headers().map_err(csv_error)?.clone();
        if headers.is_empty() {
            return Err(PluginError::parse("file has no header row"));
        }
        let headers: Vec<String> = headers
            .iter()
            .enumerate()
            .map(|(idx, name)| {
                let name = name.trim();
                if name.is_empty() {
                    format!("Unnamed: {idx}")
                } else {
                    name.to_string()
                }
            })
            .collect();

        let mut records = Vec::new();
        for record in reader.records() {
            let record = record.map_err(csv_error)?;
            records.push(record.iter().map(|field| Some(field.to_string())).collect());
        }
        Dataset::from_raw(headers, records)
    }
}

fn csv_error(err: csv::Error) -> PluginError {
    let line = err.position().map(csv::Position::line);
    match err.kind() {
        CsvErrorKind::UnequalLengths {
            expected_len, len, ..
        } => PluginError::parse(format!(
            "line {} has {len} fields, expected {expected_len}",
            line.unwrap_or_default()
        )),
        CsvErrorKind::Utf8 { .. } => PluginError::parse(format!(
            "line {} is not valid UTF-8",
            line.unwrap_or_default()
        )),
        CsvErrorKind::Io(io_err) => PluginError::internal(format!("reading data: {io_err}")),
        _ => PluginError::parse(err.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dataset::{Cell, ColumnKind};
    use std::fs;
    use tempfile::tempdir;

    #[test]
    fn loads_typed_columns_in_order() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("iris.csv");
        fs::write(
            &path,
            "sepal,petal,species\n5.1,1.4,setosa\n7.0,,versicolor\n",
        )
        .unwrap();
        let dataset = DatasetLoader::default().load(&path).unwrap();
        assert_eq!(dataset.column_names(), vec!["sepal", "petal", "species"]);
        assert_eq!(dataset.n_rows(), 2);
        assert_eq!(dataset.columns()[1].kind, ColumnKind::Numeric);
        assert_eq!(dataset.columns()[2].kind, ColumnKind::Text);
        assert_eq!(dataset.rows()[1][1], Cell::Missing);
    }

    #[test]
    fn missing_path_is_not_found() {
        let dir = tempdir().unwrap();
        let err = DatasetLoader::default()
            .load(dir.path().join("absent.csv"))
            .unwrap_err();
        assert!(matches!(err, PluginError::NotFound(_)));
    }

    #[test]
    fn ragged_rows_are_parse_errors() {
        let err = DatasetLoader::default()
            .from_reader("a,b\n1,2\n3\n".as_bytes())
            .unwrap_err();
        assert!(matches!(err, PluginError::Parse(_)), "{err:?}");
    }

    #[test]
    fn invalid_utf8_is_parse_error() {
        let bytes: &[u8] = b"a,b\n1,\xff\xfe\n";
        let err = DatasetLoader::default().from_reader(bytes).unwrap_err();
        assert!(matches!(err, PluginError::Parse(_)), "{err:?}");
    }

    #[test]
    fn empty_input_has_no_header() {
        let err = DatasetLoader::default().from_reader("".as_bytes()).unwrap_err();
        assert!(matches!(err, PluginError::Parse(_)));
    }

    #[test]
    fn honours_custom_delimiter() {
        let dataset = DatasetLoader::new(b';')
            .from_reader("x;y\n1;2\n".as_bytes())
            .unwrap();
        assert_eq!(dataset.n_cols(), 2);
    }

    #[test]
    fn blank_headers_get_placeholder_names() {
        let dataset = DatasetLoader::default()
            .from_reader(",value\n0,1\n".as_bytes())
            .unwrap();
        assert_eq!(dataset.column_names(), vec!["Unnamed: 0", "value"]);
    }
}
