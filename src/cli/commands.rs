//! CLI command implementations.
//!
//! Every command reads its input files, runs them one by one through a
//! single [`RequestBroker`] and reports per-file failures alongside the
//! results. Only fatal errors (bad configuration, unreadable inputs,
//! unwritable outputs, a dead execution context) are returned as `Err`.
//! When the context dies mid-batch, the results of the files before it are
//! still written and reported through [`Error::BatchAborted`].

use crate::batch::{
    BatchOutcome, BatchRunner, chunks_to_artifacts, fragment_to_artifact, group_by_source,
};
use crate::bridge::RequestBroker;
use crate::cli::output::{
    BindingReport, ContactMapReport, OutputFormat, format_binding_pairs, format_contact_maps,
    format_written,
};
use crate::cli::parser::{Cli, Commands};
use crate::core::{BatchArtifact, BatchInput, Call, CallOutput, InputDescriptor, StructureFormat};
use crate::error::{Error, Result, TransportError};
use crate::io::{read_inputs, write_artifacts};
use std::path::Path;

/// Executes the CLI command.
///
/// The broker is disposed before returning, on success and on error.
///
/// # Errors
///
/// Returns an error if the command fails as a whole.
pub async fn execute(cli: &Cli) -> Result<String> {
    let format = OutputFormat::parse(&cli.format);
    let broker = RequestBroker::new(cli.bridge_config()?);
    let result = run(&broker, &cli.command, format).await;
    broker.dispose().await;
    result
}

async fn run(broker: &RequestBroker, command: &Commands, format: OutputFormat) -> Result<String> {
    let inputs = read_inputs(command.files())?;

    match command {
        Commands::SplitComplex { out_dir, .. } => {
            let outcome = run_batch(
                broker,
                inputs,
                |bytes, format| Call::SplitComplex { bytes, format },
                chunks_to_artifacts,
            )
            .await;
            write_outcome(outcome, out_dir, format)
        }
        Commands::SplitChain { out_dir, .. } => {
            let outcome = run_batch(
                broker,
                inputs,
                |bytes, format| Call::SplitByChain { bytes, format },
                chunks_to_artifacts,
            )
            .await;
            write_outcome(outcome, out_dir, format)
        }
        Commands::Fragment {
            chain,
            start,
            end,
            out_dir,
            ..
        } => {
            let outcome = run_batch(
                broker,
                inputs,
                |bytes, format| Call::ExtractFragment {
                    bytes,
                    chain_id: chain.clone(),
                    start: *start,
                    end: *end,
                    format,
                },
                |output, input| fragment_to_artifact(output, input, chain),
            )
            .await;
            write_outcome(outcome, out_dir, format)
        }
        Commands::BindingPairs { cutoff, .. } => {
            let mut reports = Vec::new();
            let outcome = run_batch(
                broker,
                inputs,
                |bytes, format| Call::AnnotateBindingPairs {
                    bytes,
                    cutoff: *cutoff,
                    format,
                },
                |output, input| {
                    reports.push(binding_report(output, input)?);
                    Ok(Vec::new())
                },
            )
            .await;
            let report = format_binding_pairs(&outcome, &reports, format);
            finish(outcome.aborted, report)
        }
        Commands::ContactMap { chain, .. } => {
            let mut reports = Vec::new();
            let outcome = run_batch(
                broker,
                inputs,
                |bytes, format| Call::ContactMap {
                    bytes,
                    chain_id: chain.clone(),
                    format,
                },
                |output, input| {
                    reports.push(contact_map_report(output, input)?);
                    Ok(Vec::new())
                },
            )
            .await;
            let report = format_contact_maps(&outcome, &reports, format);
            finish(outcome.aborted, report)
        }
    }
}

async fn run_batch<M, C>(
    broker: &RequestBroker,
    inputs: Vec<BatchInput>,
    make_call: M,
    to_artifacts: C,
) -> BatchOutcome
where
    M: Fn(Vec<u8>, StructureFormat) -> Call,
    C: FnMut(&mut CallOutput, &InputDescriptor) -> Result<Vec<BatchArtifact>>,
{
    BatchRunner::new()
        .run(
            inputs,
            move |input| {
                let (descriptor, bytes) = input.into_parts();
                broker.call(make_call(bytes, descriptor.format), None)
            },
            to_artifacts,
        )
        .await
}

fn write_outcome(
    mut outcome: BatchOutcome,
    out_dir: &Path,
    format: OutputFormat,
) -> Result<String> {
    let groups = group_by_source(std::mem::take(&mut outcome.artifacts));
    let written = write_artifacts(out_dir, &groups)?;
    let report = format_written(&outcome, &written, format);
    finish(outcome.aborted, report)
}

fn finish(aborted: Option<TransportError>, report: String) -> Result<String> {
    match aborted {
        Some(source) => Err(Error::BatchAborted { report, source }),
        None => Ok(report),
    }
}

fn binding_report(output: &mut CallOutput, input: &InputDescriptor) -> Result<BindingReport> {
    match output {
        CallOutput::BindingPairs { pairs, distances } => Ok(BindingReport {
            source_name: input.source_name.clone(),
            pairs: std::mem::take(pairs),
            distances: std::mem::take(distances),
        }),
        other => Err(unexpected("binding_pairs", other)),
    }
}

fn contact_map_report(
    output: &mut CallOutput,
    input: &InputDescriptor,
) -> Result<ContactMapReport> {
    match output {
        CallOutput::ContactMap { axis, values } => Ok(ContactMapReport {
            source_name: input.source_name.clone(),
            axis: std::mem::take(axis),
            values: std::mem::take(values),
        }),
        other => Err(unexpected("contact_map", other)),
    }
}

fn unexpected(expected: &str, output: &CallOutput) -> Error {
    Error::InvalidState {
        message: format!(
            "expected {expected} result, got {}",
            output.kind().as_str()
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::BridgeConfig;
    use crate::core::{BindingPairs, Chunks, ContactMap, Fragment};
    use crate::engine::testdata::{COMPLEX_PDB, TWO_CHAINS_PDB};
    use crate::engine::{ComputationEngine, EngineLoader, StructureEngine};
    use crate::error::EngineError;
    use std::path::PathBuf;
    use tempfile::TempDir;

    /// Built-in engine whose chain split crashes the worker on `CRASH` input.
    struct CrashingEngine(StructureEngine);

    impl ComputationEngine for CrashingEngine {
        fn split_complex(
            &mut self,
            bytes: &[u8],
            format: StructureFormat,
        ) -> std::result::Result<Chunks, EngineError> {
            self.0.split_complex(bytes, format)
        }

        fn split_by_chain(
            &mut self,
            bytes: &[u8],
            format: StructureFormat,
        ) -> std::result::Result<Chunks, EngineError> {
            assert!(!bytes.starts_with(b"CRASH"), "worker crashed");
            self.0.split_by_chain(bytes, format)
        }

        fn extract_fragment(
            &mut self,
            bytes: &[u8],
            chain_id: &str,
            start: Option<i64>,
            end: Option<i64>,
            format: StructureFormat,
        ) -> std::result::Result<Fragment, EngineError> {
            self.0.extract_fragment(bytes, chain_id, start, end, format)
        }

        fn annotate_binding_pairs(
            &mut self,
            bytes: &[u8],
            cutoff: f64,
            format: StructureFormat,
        ) -> std::result::Result<BindingPairs, EngineError> {
            self.0.annotate_binding_pairs(bytes, cutoff, format)
        }

        fn contact_map(
            &mut self,
            bytes: &[u8],
            chain_id: Option<&str>,
            format: StructureFormat,
        ) -> std::result::Result<ContactMap, EngineError> {
            self.0.contact_map(bytes, chain_id, format)
        }
    }

    fn crashing_broker() -> RequestBroker {
        RequestBroker::with_loader(BridgeConfig::default(), || -> EngineLoader {
            Box::new(|| -> std::result::Result<Box<dyn ComputationEngine>, EngineError> {
                Ok(Box::new(CrashingEngine(StructureEngine::new())))
            })
        })
    }

    fn setup(files: &[(&str, &[u8])]) -> (TempDir, Vec<PathBuf>) {
        let temp_dir = TempDir::new().unwrap();
        let paths = files
            .iter()
            .map(|(name, bytes)| {
                let path = temp_dir.path().join(name);
                std::fs::write(&path, bytes).unwrap();
                path
            })
            .collect();
        (temp_dir, paths)
    }

    fn cli(command: Commands, format: &str) -> Cli {
        Cli {
            verbose: false,
            format: format.to_string(),
            timeout_ms: None,
            command,
        }
    }

    #[tokio::test]
    async fn test_split_chain_writes_files() {
        let (temp_dir, files) = setup(&[("two.pdb", TWO_CHAINS_PDB)]);
        let out_dir = temp_dir.path().join("out");
        let output = execute(&cli(
            Commands::SplitChain {
                files,
                out_dir: out_dir.clone(),
            },
            "text",
        ))
        .await
        .unwrap();

        assert!(output.contains("1 file(s): 2 written, 0 failed"));
        assert!(out_dir.join("two/two.A.pdb").is_file());
        assert!(out_dir.join("two/two.B.pdb").is_file());
    }

    #[tokio::test]
    async fn test_split_complex_records_failure() {
        let (temp_dir, files) = setup(&[
            ("complex.pdb", COMPLEX_PDB),
            ("protein.pdb", TWO_CHAINS_PDB),
        ]);
        let out_dir = temp_dir.path().join("out");
        let output = execute(&cli(
            Commands::SplitComplex {
                files,
                out_dir: out_dir.clone(),
            },
            "json",
        ))
        .await
        .unwrap();

        let value: serde_json::Value = serde_json::from_str(&output).unwrap();
        assert_eq!(value["processed"], 2);
        assert_eq!(value["results"].as_array().unwrap().len(), 2);
        assert_eq!(value["failures"][0]["source_name"], "protein.pdb");
        assert!(out_dir.join("complex/complex.Prot.pdb").is_file());
        assert!(out_dir.join("complex/complex.NA.pdb").is_file());
    }

    #[tokio::test]
    async fn test_fragment_names_range() {
        let (temp_dir, files) = setup(&[("complex.pdb", COMPLEX_PDB)]);
        let out_dir = temp_dir.path().join("out");
        execute(&cli(
            Commands::Fragment {
                files,
                chain: "A".to_string(),
                start: Some(5),
                end: None,
                out_dir: out_dir.clone(),
            },
            "text",
        ))
        .await
        .unwrap();

        assert!(out_dir.join("complex/complex.A_5-10.pdb").is_file());
    }

    #[tokio::test]
    async fn test_binding_pairs_report() {
        let (_temp_dir, files) = setup(&[("complex.pdb", COMPLEX_PDB)]);
        let output = execute(&cli(Commands::BindingPairs { files, cutoff: 5.0 }, "text"))
            .await
            .unwrap();
        assert!(output.contains("complex.pdb (1 pairs)"));
        assert!(output.contains("A-2-ALA_B-1-G"));
    }

    #[tokio::test]
    async fn test_contact_map_unknown_chain_is_per_file_failure() {
        let (_temp_dir, files) = setup(&[("complex.pdb", COMPLEX_PDB)]);
        let output = execute(&cli(
            Commands::ContactMap {
                files,
                chain: Some("Z".to_string()),
            },
            "text",
        ))
        .await
        .unwrap();
        assert!(output.contains("Failures:"));
        assert!(output.contains("chain Z not exists"));
    }

    #[tokio::test]
    async fn test_abort_writes_files_processed_before_it() {
        let (temp_dir, files) = setup(&[
            ("two.pdb", TWO_CHAINS_PDB),
            ("crash.pdb", b"CRASH"),
            ("later.pdb", TWO_CHAINS_PDB),
        ]);
        let out_dir = temp_dir.path().join("out");
        let broker = crashing_broker();
        let command = Commands::SplitChain {
            files,
            out_dir: out_dir.clone(),
        };
        let result = run(&broker, &command, OutputFormat::Json).await;
        broker.dispose().await;

        let (report, source) = match result {
            Err(Error::BatchAborted { report, source }) => (report, source),
            other => unreachable!("expected an aborted batch, got {other:?}"),
        };
        assert!(matches!(source, TransportError::Fault { .. }));
        let value: serde_json::Value = serde_json::from_str(&report).unwrap();
        assert_eq!(value["processed"], 1);
        assert_eq!(value["results"].as_array().unwrap().len(), 2);
        assert!(value["aborted"].as_str().unwrap().contains("worker crashed"));
        assert!(out_dir.join("two/two.A.pdb").is_file());
        assert!(out_dir.join("two/two.B.pdb").is_file());
        assert!(!out_dir.join("later").exists());
    }

    #[tokio::test]
    async fn test_missing_input_is_fatal() {
        let result = execute(&cli(
            Commands::BindingPairs {
                files: vec![PathBuf::from("/nonexistent/x.pdb")],
                cutoff: 5.0,
            },
            "text",
        ))
        .await;
        assert!(matches!(result, Err(Error::Io(_))));
    }
}
