//! Messages exchanged with the execution context.
//!
//! Requests carry either a typed [`Call`] or a [`RawCall`] in wire shape
//! (function name plus loosely typed JSON parameters). Responses carry the
//! extracted payload of the resulting handle, or a typed failure.
//!
//! Buffers travel inside these messages by value: once a request is sent
//! the caller no longer owns its input bytes, and a response hands its
//! payload buffers to the receiver.

use crate::core::handle::HandleKind;
use crate::core::input::StructureFormat;
use crate::error::{EngineError, ValidationError};
use serde::Serialize;
use serde_json::{Map, Value};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Names of the engine entry points.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FunctionName {
    /// Split a complex into protein and nucleic-acid parts.
    SplitComplex,
    /// Split a structure into one file per chain.
    SplitByChain,
    /// Extract a residue range of one chain.
    ExtractFragment,
    /// Find protein/nucleic residue pairs within a cutoff.
    AnnotateBindingPairs,
    /// Residue distance matrix.
    ContactMap,
}

impl FunctionName {
    /// All dispatchable functions.
    pub const ALL: [Self; 5] = [
        Self::SplitComplex,
        Self::SplitByChain,
        Self::ExtractFragment,
        Self::AnnotateBindingPairs,
        Self::ContactMap,
    ];

    /// Wire name.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::SplitComplex => "split_complex",
            Self::SplitByChain => "split_by_chain",
            Self::ExtractFragment => "extract_fragment",
            Self::AnnotateBindingPairs => "annotate_binding_pairs",
            Self::ContactMap => "contact_map",
        }
    }

    /// Handle kind the function produces.
    #[must_use]
    pub const fn output_kind(self) -> HandleKind {
        match self {
            Self::SplitComplex | Self::SplitByChain => HandleKind::Chunks,
            Self::ExtractFragment => HandleKind::Fragment,
            Self::AnnotateBindingPairs => HandleKind::BindingPairs,
            Self::ContactMap => HandleKind::ContactMap,
        }
    }
}

impl fmt::Display for FunctionName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for FunctionName {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "split_complex" => Ok(Self::SplitComplex),
            "split_by_chain" => Ok(Self::SplitByChain),
            "extract_fragment" => Ok(Self::ExtractFragment),
            "annotate_binding_pairs" => Ok(Self::AnnotateBindingPairs),
            // older clients still send the distance-map name
            "contact_map" | "d_map" => Ok(Self::ContactMap),
            other => Err(ValidationError::UnsupportedFunction {
                name: other.to_string(),
            }),
        }
    }
}

/// A typed engine invocation.
///
/// Adding a function means adding a variant here; every dispatch site
/// matches exhaustively.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "fn", rename_all = "snake_case")]
pub enum Call {
    /// See [`FunctionName::SplitComplex`].
    SplitComplex {
        /// Structure file.
        #[serde(skip)]
        bytes: Vec<u8>,
        /// Its format.
        format: StructureFormat,
    },
    /// See [`FunctionName::SplitByChain`].
    SplitByChain {
        /// Structure file.
        #[serde(skip)]
        bytes: Vec<u8>,
        /// Its format.
        format: StructureFormat,
    },
    /// See [`FunctionName::ExtractFragment`].
    ExtractFragment {
        /// Structure file.
        #[serde(skip)]
        bytes: Vec<u8>,
        /// Chain to cut from.
        chain_id: String,
        /// First residue number; `None` means the chain start.
        start: Option<i64>,
        /// Last residue number; `None` means the chain end.
        end: Option<i64>,
        /// Its format.
        format: StructureFormat,
    },
    /// See [`FunctionName::AnnotateBindingPairs`].
    AnnotateBindingPairs {
        /// Structure file.
        #[serde(skip)]
        bytes: Vec<u8>,
        /// Distance cutoff in Ångström.
        cutoff: f64,
        /// Its format.
        format: StructureFormat,
    },
    /// See [`FunctionName::ContactMap`].
    ContactMap {
        /// Structure file.
        #[serde(skip)]
        bytes: Vec<u8>,
        /// Restrict to one chain; `None` combines all chains.
        chain_id: Option<String>,
        /// Its format.
        format: StructureFormat,
    },
}

impl Call {
    /// The function this call invokes.
    #[must_use]
    pub const fn function(&self) -> FunctionName {
        match self {
            Self::SplitComplex { .. } => FunctionName::SplitComplex,
            Self::SplitByChain { .. } => FunctionName::SplitByChain,
            Self::ExtractFragment { .. } => FunctionName::ExtractFragment,
            Self::AnnotateBindingPairs { .. } => FunctionName::AnnotateBindingPairs,
            Self::ContactMap { .. } => FunctionName::ContactMap,
        }
    }

    /// Borrows the input file.
    #[must_use]
    pub fn bytes(&self) -> &[u8] {
        match self {
            Self::SplitComplex { bytes, .. }
            | Self::SplitByChain { bytes, .. }
            | Self::ExtractFragment { bytes, .. }
            | Self::AnnotateBindingPairs { bytes, .. }
            | Self::ContactMap { bytes, .. } => bytes,
        }
    }

    /// Checks parameter values before any engine call.
    ///
    /// # Errors
    ///
    /// Returns the first offending parameter.
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.bytes().is_empty() {
            return Err(ValidationError::invalid(
                "bytes",
                "must be a non-empty binary payload",
            ));
        }
        // A blank chain id is legal: legacy PDB files leave column 22 empty.
        match self {
            Self::AnnotateBindingPairs { cutoff, .. } if !cutoff.is_finite() => {
                Err(ValidationError::invalid("cutoff", "must be a finite number"))
            }
            _ => Ok(()),
        }
    }
}

/// A request in wire shape, decoded inside the execution context.
#[derive(Debug, Clone, PartialEq)]
pub struct RawCall {
    /// Requested function name.
    pub function: String,
    /// Function-specific parameters.
    pub params: Map<String, Value>,
    /// Structure file.
    pub bytes: Vec<u8>,
}

impl RawCall {
    /// Creates a raw call.
    #[must_use]
    pub fn new(function: impl Into<String>, params: Map<String, Value>, bytes: Vec<u8>) -> Self {
        Self {
            function: function.into(),
            params,
            bytes,
        }
    }

    /// Decodes into a typed [`Call`], checking parameter types.
    ///
    /// # Errors
    ///
    /// Returns [`ValidationError::UnsupportedFunction`] for unknown names and
    /// [`ValidationError::InvalidParameter`] / [`ValidationError::MissingParameter`]
    /// for malformed parameters.
    pub fn decode(self) -> Result<Call, ValidationError> {
        let function: FunctionName = self.function.parse()?;
        let params = &self.params;
        let format = format_param(params)?;
        let bytes = self.bytes;

        let call = match function {
            FunctionName::SplitComplex => Call::SplitComplex { bytes, format },
            FunctionName::SplitByChain => Call::SplitByChain { bytes, format },
            FunctionName::ExtractFragment => Call::ExtractFragment {
                chain_id: required_str(params, "chain_id")?,
                start: optional_integer(params, "start")?,
                end: optional_integer(params, "end")?,
                bytes,
                format,
            },
            FunctionName::AnnotateBindingPairs => Call::AnnotateBindingPairs {
                cutoff: required_number(params, "cutoff")?,
                bytes,
                format,
            },
            FunctionName::ContactMap => Call::ContactMap {
                chain_id: optional_str(params, "chain_id")?,
                bytes,
                format,
            },
        };
        Ok(call)
    }
}

fn param<'a>(params: &'a Map<String, Value>, name: &str) -> Option<&'a Value> {
    params.get(name).filter(|v| !v.is_null())
}

fn required_str(params: &Map<String, Value>, name: &str) -> Result<String, ValidationError> {
    match param(params, name) {
        Some(Value::String(s)) => Ok(s.clone()),
        Some(_) => Err(ValidationError::invalid(name, "must be string")),
        None => Err(ValidationError::MissingParameter {
            name: name.to_string(),
        }),
    }
}

fn optional_str(params: &Map<String, Value>, name: &str) -> Result<Option<String>, ValidationError> {
    match param(params, name) {
        Some(Value::String(s)) => Ok(Some(s.clone())),
        Some(_) => Err(ValidationError::invalid(name, "must be string|null")),
        None => Ok(None),
    }
}

fn required_number(params: &Map<String, Value>, name: &str) -> Result<f64, ValidationError> {
    match param(params, name) {
        Some(Value::Number(n)) => n
            .as_f64()
            .filter(|v| v.is_finite())
            .ok_or_else(|| ValidationError::invalid(name, "must be number")),
        Some(_) => Err(ValidationError::invalid(name, "must be number")),
        None => Err(ValidationError::MissingParameter {
            name: name.to_string(),
        }),
    }
}

// 2^63; `i64::MAX as f64` rounds up to it, so the upper bound is exclusive.
const I64_FLOAT_LIMIT: f64 = 9_223_372_036_854_775_808.0;

#[allow(clippy::cast_possible_truncation)]
fn optional_integer(params: &Map<String, Value>, name: &str) -> Result<Option<i64>, ValidationError> {
    match param(params, name) {
        Some(Value::Number(n)) => {
            if let Some(i) = n.as_i64() {
                return Ok(Some(i));
            }
            match n.as_f64() {
                Some(f) if !f.is_finite() || f.fract() != 0.0 => {
                    Err(ValidationError::invalid(name, "must be an integer"))
                }
                Some(f) if (-I64_FLOAT_LIMIT..I64_FLOAT_LIMIT).contains(&f) => Ok(Some(f as i64)),
                _ => Err(ValidationError::invalid(name, "must fit in a 64-bit integer")),
            }
        }
        Some(_) => Err(ValidationError::invalid(name, "must be number|null")),
        None => Ok(None),
    }
}

fn format_param(params: &Map<String, Value>) -> Result<StructureFormat, ValidationError> {
    match param(params, "format") {
        Some(Value::String(s)) => s.parse(),
        Some(_) => Err(ValidationError::invalid("format", "must be string")),
        None => Err(ValidationError::MissingParameter {
            name: "format".to_string(),
        }),
    }
}

/// Body of a request.
#[derive(Debug, Clone, PartialEq)]
pub enum RequestBody {
    /// Already typed.
    Typed(Call),
    /// Wire shape, decoded by the context.
    Raw(RawCall),
}

impl RequestBody {
    /// Function name for logging, as requested.
    #[must_use]
    pub fn label(&self) -> &str {
        match self {
            Self::Typed(call) => call.function().as_str(),
            Self::Raw(raw) => &raw.function,
        }
    }
}

/// A request addressed to the execution context.
#[derive(Debug, Clone, PartialEq)]
pub struct ComputationRequest {
    /// Correlation id.
    pub id: u64,
    /// What to compute.
    pub body: RequestBody,
}

/// One entry of a chunks payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ChunkItem {
    /// Chunk key (chain id, `Prot`, `NA`, ...).
    pub key: String,
    /// Chunk file.
    pub bytes: Vec<u8>,
}

/// Everything extracted from a handle.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum CallOutput {
    /// From [`crate::core::Chunks`].
    Chunks {
        /// Entries in key order.
        items: Vec<ChunkItem>,
    },
    /// From [`crate::core::Fragment`].
    Fragment {
        /// Fragment file.
        bytes: Vec<u8>,
        /// First residue number included.
        start: i64,
        /// Last residue number included.
        end: i64,
    },
    /// From [`crate::core::BindingPairs`].
    BindingPairs {
        /// Pair identifiers.
        pairs: Vec<String>,
        /// Minimum distances, aligned with `pairs`.
        distances: Vec<f64>,
    },
    /// From [`crate::core::ContactMap`].
    ContactMap {
        /// Residue labels.
        axis: Vec<String>,
        /// Row-major `axis.len()²` matrix.
        values: Vec<f64>,
    },
}

impl CallOutput {
    /// Kind of the handle this payload came from.
    #[must_use]
    pub const fn kind(&self) -> HandleKind {
        match self {
            Self::Chunks { .. } => HandleKind::Chunks,
            Self::Fragment { .. } => HandleKind::Fragment,
            Self::BindingPairs { .. } => HandleKind::BindingPairs,
            Self::ContactMap { .. } => HandleKind::ContactMap,
        }
    }

    /// Total size of the byte buffers carried.
    #[must_use]
    pub fn payload_size(&self) -> usize {
        match self {
            Self::Chunks { items } => items.iter().map(|i| i.bytes.len()).sum(),
            Self::Fragment { bytes, .. } => bytes.len(),
            Self::BindingPairs { .. } | Self::ContactMap { .. } => 0,
        }
    }
}

/// Why a call failed inside the context.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CallFailure {
    /// Rejected before the engine ran.
    #[error(transparent)]
    Validation(#[from] ValidationError),
    /// The engine reported an error.
    #[error(transparent)]
    Engine(#[from] EngineError),
}

impl From<CallFailure> for crate::error::Error {
    fn from(failure: CallFailure) -> Self {
        match failure {
            CallFailure::Validation(e) => e.into(),
            CallFailure::Engine(e) => e.into(),
        }
    }
}

/// Exactly one of these is emitted per request.
#[derive(Debug, Clone, PartialEq)]
pub struct ComputationResponse {
    /// Correlation id of the request.
    pub id: u64,
    /// Result.
    pub outcome: Result<CallOutput, CallFailure>,
}

impl ComputationResponse {
    /// Renders the wire shape: `{id, ok: true, kind, ...fields}` or
    /// `{id, ok: false, error}`.
    ///
    /// # Errors
    ///
    /// Returns an error if the payload cannot be represented as JSON.
    pub fn to_json(&self) -> Result<Value, serde_json::Error> {
        match &self.outcome {
            Ok(output) => {
                let mut value = serde_json::to_value(output)?;
                if let Value::Object(map) = &mut value {
                    map.insert("id".to_string(), Value::from(self.id));
                    map.insert("ok".to_string(), Value::Bool(true));
                }
                Ok(value)
            }
            Err(failure) => Ok(serde_json::json!({
                "id": self.id,
                "ok": false,
                "error": failure.to_string(),
            })),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use test_case::test_case;

    fn params(value: Value) -> Map<String, Value> {
        match value {
            Value::Object(map) => map,
            _ => Map::new(),
        }
    }

    #[test]
    fn test_function_names_roundtrip() {
        for function in FunctionName::ALL {
            assert_eq!(function.as_str().parse::<FunctionName>(), Ok(function));
        }
    }

    #[test]
    fn test_legacy_alias() {
        assert_eq!("d_map".parse::<FunctionName>(), Ok(FunctionName::ContactMap));
    }

    #[test]
    fn test_unknown_function() {
        let err = "fold_protein".parse::<FunctionName>().unwrap_err();
        assert!(matches!(err, ValidationError::UnsupportedFunction { .. }));
    }

    #[test]
    fn test_output_kinds() {
        assert_eq!(FunctionName::SplitByChain.output_kind(), HandleKind::Chunks);
        assert_eq!(FunctionName::ExtractFragment.output_kind(), HandleKind::Fragment);
        assert_eq!(FunctionName::ContactMap.output_kind(), HandleKind::ContactMap);
    }

    #[test]
    fn test_decode_extract_fragment_with_nulls() {
        let raw = RawCall::new(
            "extract_fragment",
            params(json!({"chain_id": "A", "start": null, "format": "pdb"})),
            vec![1],
        );
        let call = raw.decode().unwrap();
        assert_eq!(
            call,
            Call::ExtractFragment {
                bytes: vec![1],
                chain_id: "A".to_string(),
                start: None,
                end: None,
                format: StructureFormat::Pdb,
            }
        );
    }

    #[test]
    fn test_decode_integral_float_bound() {
        let raw = RawCall::new(
            "extract_fragment",
            params(json!({"chain_id": "A", "start": 5.0, "end": 10, "format": "cif"})),
            vec![1],
        );
        match raw.decode().unwrap() {
            Call::ExtractFragment { start, end, .. } => {
                assert_eq!(start, Some(5));
                assert_eq!(end, Some(10));
            }
            other => unreachable!("unexpected call {other:?}"),
        }
    }

    #[test_case(json!({"chain_id": 7, "format": "pdb"}), "chain_id must be string" ; "chain id not string")]
    #[test_case(json!({"chain_id": "A", "start": "5", "format": "pdb"}), "start must be number|null" ; "start not number")]
    #[test_case(json!({"chain_id": "A", "end": 2.5, "format": "pdb"}), "end must be an integer" ; "end fractional")]
    #[test_case(json!({"chain_id": "A", "format": 1}), "format must be string" ; "format not string")]
    #[test_case(json!({"chain_id": "A", "format": "xyz"}), "format must be pdb or cif" ; "format unknown")]
    #[test_case(json!({"format": "pdb"}), "missing parameter: chain_id" ; "chain id missing")]
    #[test_case(json!({"chain_id": "A", "start": 1e19, "format": "pdb"}), "start must fit in a 64-bit integer" ; "start too large")]
    #[test_case(json!({"chain_id": "A", "end": -1e19, "format": "pdb"}), "end must fit in a 64-bit integer" ; "end too small")]
    #[test_case(json!({"chain_id": "A", "start": 10_000_000_000_000_000_000_u64, "format": "pdb"}), "start must fit in a 64-bit integer" ; "start unsigned overflow")]
    fn test_decode_fragment_errors(value: Value, message: &str) {
        let err = RawCall::new("extract_fragment", params(value), vec![1])
            .decode()
            .unwrap_err();
        assert_eq!(err.to_string(), message);
    }

    #[test]
    fn test_decode_cutoff_must_be_number() {
        let err = RawCall::new(
            "annotate_binding_pairs",
            params(json!({"cutoff": "5", "format": "pdb"})),
            vec![1],
        )
        .decode()
        .unwrap_err();
        assert_eq!(err.to_string(), "cutoff must be number");
    }

    #[test]
    fn test_decode_contact_map_optional_chain() {
        let call = RawCall::new("d_map", params(json!({"format": "pdb"})), vec![1])
            .decode()
            .unwrap();
        assert!(matches!(call, Call::ContactMap { chain_id: None, .. }));
    }

    #[test]
    fn test_validate_rejects_non_finite_cutoff() {
        let call = Call::AnnotateBindingPairs {
            bytes: vec![1],
            cutoff: f64::NAN,
            format: StructureFormat::Pdb,
        };
        assert_eq!(
            call.validate().unwrap_err().to_string(),
            "cutoff must be a finite number"
        );
    }

    #[test]
    fn test_validate_rejects_empty_bytes() {
        let call = Call::SplitByChain {
            bytes: Vec::new(),
            format: StructureFormat::Pdb,
        };
        assert!(call.validate().is_err());
    }

    #[test]
    fn test_validate_accepts_blank_chain_and_any_finite_cutoff() {
        let calls = [
            Call::ContactMap {
                bytes: vec![1],
                chain_id: Some(" ".to_string()),
                format: StructureFormat::Pdb,
            },
            Call::ExtractFragment {
                bytes: vec![1],
                chain_id: String::new(),
                start: None,
                end: None,
                format: StructureFormat::Pdb,
            },
            Call::AnnotateBindingPairs {
                bytes: vec![1],
                cutoff: -1.0,
                format: StructureFormat::Pdb,
            },
            Call::AnnotateBindingPairs {
                bytes: vec![1],
                cutoff: 0.0,
                format: StructureFormat::Pdb,
            },
        ];
        for call in &calls {
            assert_eq!(call.validate(), Ok(()), "{call:?}");
        }
    }

    #[test]
    fn test_call_serializes_without_bytes() {
        let call = Call::AnnotateBindingPairs {
            bytes: vec![1, 2, 3],
            cutoff: 5.0,
            format: StructureFormat::Cif,
        };
        let value = serde_json::to_value(&call).unwrap();
        assert_eq!(
            value,
            json!({"fn": "annotate_binding_pairs", "cutoff": 5.0, "format": "cif"})
        );
    }

    #[test]
    fn test_response_wire_success() {
        let response = ComputationResponse {
            id: 3,
            outcome: Ok(CallOutput::BindingPairs {
                pairs: vec!["A-1-ARG_B-2-G".to_string()],
                distances: vec![3.5],
            }),
        };
        let value = response.to_json().unwrap();
        assert_eq!(value["id"], 3);
        assert_eq!(value["ok"], true);
        assert_eq!(value["kind"], "binding_pairs");
        assert_eq!(value["distances"][0], 3.5);
    }

    #[test]
    fn test_response_wire_failure() {
        let response = ComputationResponse {
            id: 9,
            outcome: Err(EngineError::NotAComplex.into()),
        };
        assert_eq!(
            response.to_json().unwrap(),
            json!({"id": 9, "ok": false, "error": "not a protein-nucleic acid complex"})
        );
    }

    #[test]
    fn test_payload_size() {
        let output = CallOutput::Chunks {
            items: vec![
                ChunkItem {
                    key: "A".to_string(),
                    bytes: vec![0; 4],
                },
                ChunkItem {
                    key: "B".to_string(),
                    bytes: vec![0; 6],
                },
            ],
        };
        assert_eq!(output.payload_size(), 10);
        assert_eq!(output.kind(), HandleKind::Chunks);
    }
}
