//! Call argument encoding.
//!
//! Every positional argument of a table-function call is described to the
//! worker by its declared type, its value when the expression is constant,
//! and whether it stands for a whole relation.

use crate::error::{ProtocolError, SerializationError};
use crate::types::{DataType, StructType};
use crate::value::Literal;
use crate::wire::{self, WireReader};
use bytes::{Bytes, BytesMut};
use std::io::Read;

/// An argument expression as seen by the encoder.
///
/// Planners implement this for their own expression trees; [`Expr`] covers
/// the common cases.
pub trait ArgumentExpression {
    /// Static result type of the expression.
    fn data_type(&self) -> DataType;

    /// Whether the expression is known at plan time.
    fn is_foldable(&self) -> bool;

    /// Evaluates a foldable expression. Never called otherwise.
    fn eval(&self) -> Result<Literal, SerializationError>;
}

/// A minimal argument expression.
#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    /// A constant.
    Literal { value: Literal, data_type: DataType },
    /// A column reference resolved at execution time.
    Column { name: String, data_type: DataType },
    /// A relation passed as `TABLE(...)`.
    Table { schema: StructType },
}

impl Expr {
    pub fn literal(value: impl Into<Literal>, data_type: DataType) -> Self {
        Expr::Literal {
            value: value.into(),
            data_type,
        }
    }

    pub fn column(name: impl Into<String>, data_type: DataType) -> Self {
        Expr::Column {
            name: name.into(),
            data_type,
        }
    }

    pub fn table(schema: StructType) -> Self {
        Expr::Table { schema }
    }
}

impl ArgumentExpression for Expr {
    fn data_type(&self) -> DataType {
        match self {
            Expr::Literal { data_type, .. } | Expr::Column { data_type, .. } => data_type.clone(),
            Expr::Table { schema } => DataType::Struct(schema.clone()),
        }
    }

    fn is_foldable(&self) -> bool {
        matches!(self, Expr::Literal { .. })
    }

    fn eval(&self) -> Result<Literal, SerializationError> {
        match self {
            Expr::Literal { value, .. } => Ok(value.clone()),
            Expr::Column { name, .. } => Err(SerializationError::Evaluation(format!(
                "column '{}' has no value at plan time",
                name
            ))),
            Expr::Table { .. } => Err(SerializationError::Evaluation(
                "table arguments have no value at plan time".to_string(),
            )),
        }
    }
}

/// One positional argument before serialization.
#[derive(Debug, Clone, PartialEq)]
pub struct CallArgument {
    pub declared_type: DataType,
    pub literal_value: Option<Literal>,
    pub is_table_argument: bool,
}

impl CallArgument {
    /// Describes `expr`, evaluating it only when it is foldable.
    pub fn from_expression<E: ArgumentExpression + ?Sized>(
        expr: &E,
        is_table_argument: bool,
    ) -> Result<Self, SerializationError> {
        let literal_value = if expr.is_foldable() {
            Some(expr.eval()?)
        } else {
            None
        };
        Ok(Self {
            declared_type: expr.data_type(),
            literal_value,
            is_table_argument,
        })
    }

    /// Serializes the type descriptor and value.
    pub fn encode(&self) -> Result<EncodedArgument, SerializationError> {
        let value = self
            .literal_value
            .as_ref()
            .map(|v| v.encode(&self.declared_type))
            .transpose()?;
        Ok(EncodedArgument {
            type_json: self.declared_type.json(),
            value,
            is_table: self.is_table_argument,
        })
    }
}

/// One argument ready for the wire.
///
/// ```text
/// +-------------------+-----------+----------------------+----------+
/// | utf type JSON     | has_value | [int32 len + value]  | is_table |
/// +-------------------+-----------+----------------------+----------+
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncodedArgument {
    pub type_json: String,
    pub value: Option<Bytes>,
    pub is_table: bool,
}

impl EncodedArgument {
    pub fn put(&self, buf: &mut BytesMut) -> Result<(), ProtocolError> {
        wire::put_utf(buf, &self.type_json)?;
        match &self.value {
            Some(value) => {
                wire::put_bool(buf, true);
                wire::put_block(buf, value)?;
            }
            None => wire::put_bool(buf, false),
        }
        wire::put_bool(buf, self.is_table);
        Ok(())
    }

    pub fn read<R: Read>(reader: &mut WireReader<R>) -> Result<Self, ProtocolError> {
        let type_json = reader.read_utf()?;
        let value = if reader.read_bool()? {
            Some(reader.read_block()?)
        } else {
            None
        };
        let is_table = reader.read_bool()?;
        Ok(Self {
            type_json,
            value,
            is_table,
        })
    }

    /// Parses the declared type back out of the descriptor.
    pub fn data_type(&self) -> Result<DataType, ProtocolError> {
        DataType::from_json(&self.type_json)
    }
}

/// Encodes every argument of a call.
///
/// `table_args[i]` marks `exprs[i]` as a table argument. All arguments are
/// serialized before anything is returned, so a failure leaves nothing
/// half-written.
pub fn encode_arguments<E: ArgumentExpression>(
    exprs: &[E],
    table_args: &[bool],
) -> Result<Vec<EncodedArgument>, SerializationError> {
    if exprs.len() != table_args.len() {
        return Err(SerializationError::ArityMismatch {
            expressions: exprs.len(),
            flags: table_args.len(),
        });
    }
    exprs
        .iter()
        .zip(table_args)
        .map(|(expr, is_table)| CallArgument::from_expression(expr, *is_table)?.encode())
        .collect()
}
