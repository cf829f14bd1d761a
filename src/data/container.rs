//! Parquet container for a whole database: one row per dataset.
//!
//! Row-major 2-D and 3-D arrays are flattened into `list<f64>` cells, their
//! shapes are carried by the `n_*` axis-length columns. Optional arrays
//! (`realpart`, participation) are null cells. Mode descriptors are stored as
//! one JSON document per list entry so the labels survive unchanged.

use std::collections::{BTreeMap, HashMap};
use std::fs::{self, File};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use arrow::array::{
    Array, ArrayRef, Float64Array, Float64Builder, LargeListArray, ListArray, ListBuilder,
    StringArray, StringBuilder, UInt64Array, UInt64Builder,
};
use arrow::datatypes::{DataType, Field, Schema};
use arrow::record_batch::RecordBatch;
use log::debug;
use parquet::arrow::arrow_reader::ParquetRecordBatchReaderBuilder;
use parquet::arrow::ArrowWriter;

use super::database::DatasetKey;
use super::model::{AEMode, Array2, Array3, Dataset, DatasetBuilder};
use crate::error::DbError;

pub const FORMAT_KEY: &str = "format";
pub const FORMAT_NAME: &str = "rusty-campbell-database";
pub const VERSION_KEY: &str = "format_version";
pub const FORMAT_VERSION: &str = "1";

fn float_list(name: &str, nullable: bool) -> Field {
    Field::new(
        name,
        DataType::List(Arc::new(Field::new("item", DataType::Float64, true))),
        nullable,
    )
}

fn string_list(name: &str) -> Field {
    Field::new(
        name,
        DataType::List(Arc::new(Field::new("item", DataType::Utf8, true))),
        false,
    )
}

fn container_schema() -> Schema {
    let fields = vec![
        Field::new("group", DataType::Utf8, false),
        Field::new("tool", DataType::Utf8, false),
        Field::new("name", DataType::Utf8, false),
        Field::new("n_operating_points", DataType::UInt64, false),
        Field::new("n_modes", DataType::UInt64, false),
        Field::new("n_participation_modes", DataType::UInt64, false),
        string_list("operating_parameters"),
        float_list("operating_points", false),
        float_list("frequency", false),
        float_list("damping", false),
        float_list("realpart", true),
        float_list("participation_factors_amp", true),
        float_list("participation_factors_phase", true),
        string_list("modes"),
        string_list("participation_modes"),
        Field::new("attributes", DataType::Utf8, false),
    ];
    let metadata = HashMap::from([
        (FORMAT_KEY.to_string(), FORMAT_NAME.to_string()),
        (VERSION_KEY.to_string(), FORMAT_VERSION.to_string()),
    ]);
    Schema::new_with_metadata(fields, metadata)
}

// ---------------------------------------------------------------------------
// Writing
// ---------------------------------------------------------------------------

fn push_floats(builder: &mut ListBuilder<Float64Builder>, values: Option<&[f64]>) {
    match values {
        Some(values) => {
            builder.values().append_slice(values);
            builder.append(true);
        }
        None => builder.append(false),
    }
}

fn push_strings<S: AsRef<str>>(builder: &mut ListBuilder<StringBuilder>, values: &[S]) {
    for v in values {
        builder.values().append_value(v);
    }
    builder.append(true);
}

fn mode_documents(modes: &[AEMode]) -> Result<Vec<String>, DbError> {
    modes
        .iter()
        .map(|m| serde_json::to_string(m).map_err(DbError::from))
        .collect()
}

fn build_batch(schema: Arc<Schema>, groups: &[(&DatasetKey, &Dataset)]) -> Result<RecordBatch, DbError> {
    let mut group_col = StringBuilder::new();
    let mut tool_col = StringBuilder::new();
    let mut name_col = StringBuilder::new();
    let mut n_op_col = UInt64Builder::new();
    let mut n_modes_col = UInt64Builder::new();
    let mut n_pmodes_col = UInt64Builder::new();
    let mut params_col = ListBuilder::new(StringBuilder::new());
    let mut op_col = ListBuilder::new(Float64Builder::new());
    let mut freq_col = ListBuilder::new(Float64Builder::new());
    let mut damp_col = ListBuilder::new(Float64Builder::new());
    let mut real_col = ListBuilder::new(Float64Builder::new());
    let mut amp_col = ListBuilder::new(Float64Builder::new());
    let mut phase_col = ListBuilder::new(Float64Builder::new());
    let mut modes_col = ListBuilder::new(StringBuilder::new());
    let mut pmodes_col = ListBuilder::new(StringBuilder::new());
    let mut attrs_col = StringBuilder::new();

    for (key, ds) in groups {
        group_col.append_value(key.group_name());
        tool_col.append_value(&key.tool);
        name_col.append_value(&key.name);
        n_op_col.append_value(ds.num_operating_points() as u64);
        n_modes_col.append_value(ds.num_modes() as u64);
        n_pmodes_col.append_value(ds.num_participation_modes() as u64);

        push_strings(&mut params_col, ds.operating_parameters());
        push_floats(&mut op_col, Some(ds.operating_points().as_slice()));
        push_floats(&mut freq_col, Some(ds.frequency().as_slice()));
        push_floats(&mut damp_col, Some(ds.damping().as_slice()));
        push_floats(&mut real_col, ds.realpart().map(Array2::as_slice));
        push_floats(&mut amp_col, ds.participation_factors_amp().map(Array3::as_slice));
        push_floats(&mut phase_col, ds.participation_factors_phase().map(Array3::as_slice));
        push_strings(&mut modes_col, &mode_documents(ds.modes())?);
        push_strings(&mut pmodes_col, &mode_documents(ds.participation_modes())?);
        attrs_col.append_value(serde_json::to_string(ds.attributes())?);
    }

    let columns: Vec<ArrayRef> = vec![
        Arc::new(group_col.finish()),
        Arc::new(tool_col.finish()),
        Arc::new(name_col.finish()),
        Arc::new(n_op_col.finish()),
        Arc::new(n_modes_col.finish()),
        Arc::new(n_pmodes_col.finish()),
        Arc::new(params_col.finish()),
        Arc::new(op_col.finish()),
        Arc::new(freq_col.finish()),
        Arc::new(damp_col.finish()),
        Arc::new(real_col.finish()),
        Arc::new(amp_col.finish()),
        Arc::new(phase_col.finish()),
        Arc::new(modes_col.finish()),
        Arc::new(pmodes_col.finish()),
        Arc::new(attrs_col.finish()),
    ];
    Ok(RecordBatch::try_new(schema, columns)?)
}

fn io_error(path: &Path) -> impl FnOnce(std::io::Error) -> DbError + '_ {
    move |source| DbError::Io {
        path: path.to_path_buf(),
        source,
    }
}

fn write_file(partial: &Path, target: &Path, schema: Arc<Schema>, batch: &RecordBatch) -> Result<(), DbError> {
    let file = File::create(partial).map_err(io_error(partial))?;
    let mut writer = ArrowWriter::try_new(file, schema, None)?;
    if batch.num_rows() > 0 {
        writer.write(batch)?;
    }
    writer.close()?;
    fs::rename(partial, target).map_err(io_error(target))
}

/// `<path>.partial`, next to the target.
fn scratch_path(path: &Path) -> PathBuf {
    let mut name = path.as_os_str().to_owned();
    name.push(".partial");
    PathBuf::from(name)
}

/// Write `groups` to `path`, replacing any existing file.
///
/// The container is first written next to the target and then renamed over
/// it, so a failed save leaves the previous file intact.
pub(crate) fn write(path: &Path, groups: &[(&DatasetKey, &Dataset)]) -> Result<(), DbError> {
    let schema = Arc::new(container_schema());
    let batch = build_batch(schema.clone(), groups)?;

    let partial = scratch_path(path);
    if let Err(e) = write_file(&partial, path, schema, &batch) {
        let _ = fs::remove_file(&partial);
        return Err(e);
    }
    debug!("wrote {} container rows to {}", batch.num_rows(), path.display());
    Ok(())
}

// ---------------------------------------------------------------------------
// Reading
// ---------------------------------------------------------------------------

/// Reasons are plain strings here; [`read`] wraps them in `CorruptContainer`.
type Checked<T> = Result<T, String>;

fn check_format(metadata: &HashMap<String, String>) -> Checked<()> {
    match metadata.get(FORMAT_KEY).map(String::as_str) {
        Some(FORMAT_NAME) => {}
        Some(other) => return Err(format!("unknown container format '{other}'")),
        None => return Err("missing container format marker".to_string()),
    }
    match metadata.get(VERSION_KEY).map(String::as_str) {
        Some(FORMAT_VERSION) => Ok(()),
        Some(other) => Err(format!("unsupported container version '{other}'")),
        None => Err("missing container version".to_string()),
    }
}

fn column<'a>(batch: &'a RecordBatch, name: &str) -> Checked<&'a ArrayRef> {
    batch
        .column_by_name(name)
        .ok_or_else(|| format!("missing column '{name}'"))
}

fn string_at(batch: &RecordBatch, name: &str, row: usize) -> Checked<String> {
    let col = column(batch, name)?;
    let strings = col
        .as_any()
        .downcast_ref::<StringArray>()
        .ok_or_else(|| format!("column '{name}' is not a string column"))?;
    if strings.is_null(row) {
        return Err(format!("column '{name}' is null"));
    }
    Ok(strings.value(row).to_string())
}

fn count_at(batch: &RecordBatch, name: &str, row: usize) -> Checked<usize> {
    let col = column(batch, name)?;
    let counts = col
        .as_any()
        .downcast_ref::<UInt64Array>()
        .ok_or_else(|| format!("column '{name}' is not an unsigned integer column"))?;
    if counts.is_null(row) {
        return Err(format!("column '{name}' is null"));
    }
    usize::try_from(counts.value(row)).map_err(|_| format!("column '{name}' overflows"))
}

/// The list cell at `row`, or `None` when the cell is null.
fn list_cell(col: &ArrayRef, name: &str, row: usize) -> Checked<Option<ArrayRef>> {
    if col.is_null(row) {
        return Ok(None);
    }
    let values = match col.data_type() {
        DataType::List(_) => col
            .as_any()
            .downcast_ref::<ListArray>()
            .map(|l| l.value(row)),
        DataType::LargeList(_) => col
            .as_any()
            .downcast_ref::<LargeListArray>()
            .map(|l| l.value(row)),
        other => return Err(format!("column '{name}' has type {other:?}, expected a list")),
    };
    values
        .map(Some)
        .ok_or_else(|| format!("column '{name}' is not a list array"))
}

fn floats_at(batch: &RecordBatch, name: &str, row: usize) -> Checked<Option<Vec<f64>>> {
    let Some(values) = list_cell(column(batch, name)?, name, row)? else {
        return Ok(None);
    };
    let floats = values
        .as_any()
        .downcast_ref::<Float64Array>()
        .ok_or_else(|| format!("column '{name}' does not hold f64 values"))?;
    if floats.null_count() > 0 {
        return Err(format!("column '{name}' holds null entries"));
    }
    Ok(Some(floats.values().to_vec()))
}

fn required_floats_at(batch: &RecordBatch, name: &str, row: usize) -> Checked<Vec<f64>> {
    floats_at(batch, name, row)?.ok_or_else(|| format!("column '{name}' is null"))
}

fn strings_at(batch: &RecordBatch, name: &str, row: usize) -> Checked<Vec<String>> {
    let values = list_cell(column(batch, name)?, name, row)?
        .ok_or_else(|| format!("column '{name}' is null"))?;
    let strings = values
        .as_any()
        .downcast_ref::<StringArray>()
        .ok_or_else(|| format!("column '{name}' does not hold strings"))?;
    strings
        .iter()
        .map(|s| s.map(str::to_string).ok_or_else(|| format!("column '{name}' holds null entries")))
        .collect()
}

fn modes_at(batch: &RecordBatch, name: &str, row: usize) -> Checked<Vec<AEMode>> {
    strings_at(batch, name, row)?
        .iter()
        .map(|doc| serde_json::from_str(doc).map_err(|e| format!("column '{name}': bad mode descriptor: {e}")))
        .collect()
}

fn read_group(batch: &RecordBatch, row: usize) -> Checked<(DatasetKey, Dataset)> {
    let group = string_at(batch, "group", row)?;
    let key = DatasetKey::new(string_at(batch, "tool", row)?, string_at(batch, "name", row)?);
    if group != key.group_name() {
        return Err(format!("group '{group}' does not match its tool and name"));
    }
    let in_group = |reason: String| format!("group '{group}': {reason}");

    let n_op = count_at(batch, "n_operating_points", row).map_err(in_group)?;
    let n_modes = count_at(batch, "n_modes", row).map_err(in_group)?;
    let n_pmodes = count_at(batch, "n_participation_modes", row).map_err(in_group)?;

    let parameters = strings_at(batch, "operating_parameters", row).map_err(in_group)?;
    let modes = modes_at(batch, "modes", row).map_err(in_group)?;
    let pmodes = modes_at(batch, "participation_modes", row).map_err(in_group)?;
    if modes.len() != n_modes {
        return Err(in_group(format!("{} mode descriptors for {n_modes} modes", modes.len())));
    }
    if pmodes.len() != n_pmodes {
        return Err(in_group(format!(
            "{} participation mode descriptors for {n_pmodes} participation modes",
            pmodes.len()
        )));
    }

    let matrix = |name: &str, cols: usize| -> Checked<Array2> {
        let data = required_floats_at(batch, name, row)?;
        Array2::new([n_op, cols], data).map_err(|e| format!("column '{name}': {e}"))
    };
    let cube = |name: &str| -> Checked<Option<Array3>> {
        floats_at(batch, name, row)?
            .map(|data| Array3::new([n_op, n_pmodes, n_modes], data))
            .transpose()
            .map_err(|e| format!("column '{name}': {e}"))
    };

    let mut builder = DatasetBuilder::new()
        .operating_points(parameters.clone(), matrix("operating_points", parameters.len()).map_err(in_group)?)
        .frequency(matrix("frequency", n_modes).map_err(in_group)?)
        .damping(matrix("damping", n_modes).map_err(in_group)?)
        .modes(modes);
    if let Some(data) = floats_at(batch, "realpart", row).map_err(in_group)? {
        let realpart = Array2::new([n_op, n_modes], data).map_err(|e| in_group(format!("column 'realpart': {e}")))?;
        builder = builder.realpart(realpart);
    }

    let amp = cube("participation_factors_amp").map_err(in_group)?;
    let phase = cube("participation_factors_phase").map_err(in_group)?;
    if amp.is_some() || phase.is_some() || !pmodes.is_empty() {
        builder = builder.participation_modes(pmodes);
    }
    if let Some(amp) = amp {
        builder = builder.participation_amp(amp);
    }
    if let Some(phase) = phase {
        builder = builder.participation_phase(phase);
    }

    let attributes: BTreeMap<String, String> = serde_json::from_str(&string_at(batch, "attributes", row)?)
        .map_err(|e| in_group(format!("bad attributes: {e}")))?;

    let dataset = builder
        .attributes(attributes)
        .build()
        .map_err(|e| in_group(e.to_string()))?;
    Ok((key, dataset))
}

/// Read every group of a container, in file order.
pub(crate) fn read(path: &Path) -> Result<Vec<(DatasetKey, Dataset)>, DbError> {
    let corrupt = |reason: String| DbError::CorruptContainer {
        path: path.to_path_buf(),
        reason,
    };

    let file = File::open(path).map_err(io_error(path))?;
    let builder = ParquetRecordBatchReaderBuilder::try_new(file)
        .map_err(|e| corrupt(format!("not a parquet file: {e}")))?;
    check_format(builder.schema().metadata()).map_err(corrupt)?;
    let reader = builder
        .build()
        .map_err(|e| corrupt(format!("unreadable row group: {e}")))?;

    let mut groups = Vec::new();
    for batch in reader {
        let batch = batch.map_err(|e| corrupt(format!("unreadable row group: {e}")))?;
        for row in 0..batch.num_rows() {
            groups.push(read_group(&batch, row).map_err(corrupt)?);
        }
    }
    debug!("read {} container rows from {}", groups.len(), path.display());
    Ok(groups)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::model::tests::sample_dataset;

    fn without_participation() -> Dataset {
        DatasetBuilder::new()
            .frequency(Array2::from_rows(&[vec![0.3]], 1).unwrap())
            .damping(Array2::from_rows(&[vec![f64::NAN]], 1).unwrap())
            .realpart(Array2::from_rows(&[vec![-0.01]], 1).unwrap())
            .operating_points(vec!["wind speed [m/s]".into()], Array2::from_rows(&[vec![10.0]], 1).unwrap())
            .modes(vec![AEMode::new("mode 1")])
            .build()
            .unwrap()
    }

    #[test]
    fn datasets_survive_a_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("db.parquet");

        let a = (DatasetKey::new("HAWCStab2", "case"), sample_dataset());
        let b = (DatasetKey::new("Bladed (lin.)", "lin"), without_participation());
        write(&path, &[(&a.0, &a.1), (&b.0, &b.1)]).unwrap();

        let groups = read(&path).unwrap();
        assert_eq!(groups, vec![a, b]);
        assert!(!scratch_path(&path).exists());
    }

    #[test]
    fn empty_container_reads_back_empty() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("empty.parquet");
        write(&path, &[]).unwrap();
        assert!(read(&path).unwrap().is_empty());
    }

    #[test]
    fn foreign_files_are_rejected() {
        let dir = tempfile::tempdir().unwrap();

        let text = dir.path().join("notes.parquet");
        fs::write(&text, "not a container").unwrap();
        assert!(matches!(read(&text), Err(DbError::CorruptContainer { .. })));

        // A valid parquet file without the format marker.
        let plain = dir.path().join("plain.parquet");
        let schema = Arc::new(Schema::new(vec![Field::new("x", DataType::Float64, false)]));
        let batch = RecordBatch::try_new(
            schema.clone(),
            vec![Arc::new(Float64Array::from(vec![1.0, 2.0])) as ArrayRef],
        )
        .unwrap();
        let mut writer = ArrowWriter::try_new(File::create(&plain).unwrap(), schema, None).unwrap();
        writer.write(&batch).unwrap();
        writer.close().unwrap();

        match read(&plain) {
            Err(DbError::CorruptContainer { reason, .. }) => assert!(reason.contains("format marker")),
            other => panic!("expected a corrupt container, got {other:?}"),
        }

        assert!(matches!(
            read(&dir.path().join("missing.parquet")),
            Err(DbError::Io { .. })
        ));
    }

    #[test]
    fn scratch_file_keeps_the_target_name() {
        let dir = tempfile::tempdir().unwrap();
        assert_eq!(scratch_path(Path::new("db.parquet")), Path::new("db.parquet.partial"));

        // A target that already ends in `.partial` still gets its own scratch file.
        let path = dir.path().join("db.partial");
        write(&path, &[]).unwrap();
        let ds = sample_dataset();
        let key = DatasetKey::new("HAWCStab2", "case");
        write(&path, &[(&key, &ds)]).unwrap();
        assert_eq!(read(&path).unwrap().len(), 1);
        assert!(!dir.path().join("db.partial.partial").exists());
    }

    #[test]
    fn damaged_page_data_is_a_corrupt_container() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("db.parquet");
        let ds = sample_dataset();
        let key = DatasetKey::new("HAWCStab2", "case");
        write(&path, &[(&key, &ds)]).unwrap();

        // The first column chunk starts right after the leading magic; the
        // footer stays intact so only page decoding fails.
        let mut bytes = fs::read(&path).unwrap();
        for b in &mut bytes[4..24] {
            *b = 0xFF;
        }
        fs::write(&path, &bytes).unwrap();

        assert!(matches!(read(&path), Err(DbError::CorruptContainer { .. })));
    }

    #[test]
    fn format_version_is_checked() {
        let mut metadata = HashMap::new();
        metadata.insert(FORMAT_KEY.to_string(), FORMAT_NAME.to_string());
        metadata.insert(VERSION_KEY.to_string(), "99".to_string());
        assert!(check_format(&metadata).unwrap_err().contains("99"));

        metadata.insert(VERSION_KEY.to_string(), FORMAT_VERSION.to_string());
        assert!(check_format(&metadata).is_ok());
    }
}
