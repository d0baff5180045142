//! Function handle and argument files read by the CLI.

use serde::{Deserialize, Deserializer};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use udtf_protocol::{DataType, Expr, Literal};
use udtf_worker::{BroadcastRef, FunctionHandle};

type BoxError = Box<dyn std::error::Error>;

/// Describes a function handle on disk.
///
/// `command_file` holds the serialized function body and is resolved
/// relative to the description file.
#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct FunctionFile {
    pub executable: PathBuf,
    pub version: String,
    pub command_file: PathBuf,
    #[serde(default)]
    pub job_artifact_id: Option<String>,
    #[serde(default)]
    pub includes: Vec<String>,
    #[serde(default)]
    pub broadcasts: Vec<BroadcastRef>,
    #[serde(default)]
    pub env: BTreeMap<String, String>,
}

impl FunctionFile {
    pub fn load(path: &Path) -> Result<FunctionHandle, BoxError> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| format!("failed to read '{}': {}", path.display(), e))?;
        let file: FunctionFile = serde_json::from_str(&content)
            .map_err(|e| format!("failed to parse '{}': {}", path.display(), e))?;

        let command_path = match path.parent() {
            Some(dir) if file.command_file.is_relative() => dir.join(&file.command_file),
            _ => file.command_file.clone(),
        };
        let command = std::fs::read(&command_path)
            .map_err(|e| format!("failed to read '{}': {}", command_path.display(), e))?;

        let mut handle = FunctionHandle::new(command, file.executable, file.version);
        if let Some(id) = file.job_artifact_id {
            handle = handle.with_job_artifact_id(id);
        }
        for include in file.includes {
            handle = handle.with_include(include);
        }
        for broadcast in file.broadcasts {
            handle = handle.with_broadcast(broadcast);
        }
        for (key, value) in file.env {
            handle = handle.with_env(key, value);
        }
        Ok(handle)
    }
}

/// One call argument on disk.
#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ArgumentSpec {
    #[serde(rename = "type")]
    pub data_type: DataType,
    /// Constant value; absent for non-constant arguments. An explicit
    /// `null` is a constant null, not a column.
    #[serde(default, deserialize_with = "present")]
    pub value: Option<serde_json::Value>,
    #[serde(default)]
    pub table: bool,
}

fn present<'de, D: Deserializer<'de>>(d: D) -> Result<Option<serde_json::Value>, D::Error> {
    serde_json::Value::deserialize(d).map(Some)
}

impl ArgumentSpec {
    fn into_expr(self, position: usize) -> Result<Expr, BoxError> {
        if self.table {
            return match self.data_type {
                DataType::Struct(schema) => Ok(Expr::table(schema)),
                other => Err(format!(
                    "argument {} is a table argument but has type {}",
                    position, other
                )
                .into()),
            };
        }
        match self.value {
            Some(value) => {
                let literal = Literal::from_wire_json(&value, &self.data_type)?;
                Ok(Expr::literal(literal, self.data_type))
            }
            None => Ok(Expr::column(format!("arg{}", position), self.data_type)),
        }
    }
}

/// Loads the argument list, returning expressions and table flags.
pub fn load_arguments(path: &Path) -> Result<(Vec<Expr>, Vec<bool>), BoxError> {
    let content = std::fs::read_to_string(path)
        .map_err(|e| format!("failed to read '{}': {}", path.display(), e))?;
    let specs: Vec<ArgumentSpec> = serde_json::from_str(&content)
        .map_err(|e| format!("failed to parse '{}': {}", path.display(), e))?;

    let mut exprs = Vec::with_capacity(specs.len());
    let mut table_args = Vec::with_capacity(specs.len());
    for (i, spec) in specs.into_iter().enumerate() {
        table_args.push(spec.table);
        exprs.push(spec.into_expr(i)?);
    }
    Ok((exprs, table_args))
}
