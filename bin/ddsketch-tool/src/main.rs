//! Command-line tool for inspecting, querying, and merging serialized quantile sketches.

#![deny(warnings)]

use std::{
    fs,
    io::{self, Read as _, Write},
    path::Path,
};

use anyhow::{bail, Context as _};
use clap::Parser as _;
use ddsketch_wire::ops::{self, SumAggregate};
use serde::Serialize;
use tracing::{debug, error, warn};
use tracing_subscriber::EnvFilter;

mod cli;
use self::cli::{Action, Cli};

mod config;
use self::config::{Config, OutputFormat};

fn main() {
    let cli = Cli::parse();

    tracing_subscriber::fmt()
        .compact()
        .with_env_filter(
            EnvFilter::builder()
                .with_default_directive(cli.log_level().into())
                .from_env_lossy(),
        )
        .with_writer(io::stderr)
        .with_target(true)
        .init();

    if let Err(e) = run(cli) {
        error!("{:?}", e);
        std::process::exit(1);
    }
}

fn run(cli: Cli) -> anyhow::Result<()> {
    let config = match cli.config.as_deref() {
        Some(path) => Config::try_from_file(path)?,
        None => Config::default(),
    };
    debug!(?config, "Loaded configuration.");

    let stdout = io::stdout();
    let mut out = stdout.lock();
    execute(cli.action, &config, &mut out)?;
    out.flush().context("Failed to flush standard output.")
}

fn execute<W: Write>(action: Action, config: &Config, out: &mut W) -> anyhow::Result<()> {
    match action {
        Action::Inspect(args) => {
            let data = read_input(&args.input)?;
            let rendered =
                ops::inspect(&data).with_context(|| format!("Failed to inspect '{}'.", args.input.display()))?;
            writeln!(out, "{}", rendered)?;
        }
        Action::Json(args) => {
            let data = read_input(&args.input)?;
            let rendered = ops::json(&data).with_context(|| format!("Failed to render '{}'.", args.input.display()))?;
            writeln!(out, "{}", rendered)?;
        }
        Action::Quantile(args) => {
            let data = read_input(&args.input)?;
            let value = ops::quantile_with_options(args.q, &data, config.quantile_options());
            write_scalar(out, config.output, value)?;
        }
        Action::Mean(args) => {
            let data = read_input(&args.input)?;
            write_scalar(out, config.output, ops::mean(&data))?;
        }
        Action::Count(args) => {
            let data = read_input(&args.input)?;
            write_scalar(out, config.output, ops::count(&data))?;
        }
        Action::Total(args) => {
            let data = read_input(&args.input)?;
            write_scalar(out, config.output, ops::total(&data))?;
        }
        Action::Validate(args) => {
            let mut invalid = 0usize;
            for input in &args.inputs {
                let data = read_input(input)?;
                let valid = ops::is_valid(&data);
                if !valid {
                    invalid += 1;
                }

                match config.output {
                    OutputFormat::Text => {
                        let status = if valid { "valid" } else { "invalid" };
                        writeln!(out, "{}: {}", input.display(), status)?;
                    }
                    OutputFormat::Json => {
                        let line = serde_json::json!({ "input": input.display().to_string(), "valid": valid });
                        writeln!(out, "{}", line)?;
                    }
                }
            }

            if invalid > 0 {
                bail!("{} of {} inputs are not valid sketches.", invalid, args.inputs.len());
            }
        }
        Action::Merge(args) => {
            let left = args.left.as_deref().map(read_input).transpose()?;
            let right = args.right.as_deref().map(read_input).transpose()?;

            let merged = ops::merge_pair(left.as_deref(), right.as_deref()).context("Failed to merge sketches.")?;
            let Some(merged) = merged else {
                bail!("No sketches to merge.");
            };
            write_output(args.output.as_deref(), &merged, out)?;
        }
        Action::Sum(args) => {
            let mut aggregate = SumAggregate::with_policy(config.merge_policy);
            for input in &args.inputs {
                let data = read_input(input)?;
                match aggregate.add(Some(&data)) {
                    Ok(()) => debug!(input = %input.display(), "Merged sketch."),
                    Err(e) if args.skip_invalid => {
                        warn!(input = %input.display(), error = %e, "Skipping sketch that failed to merge.")
                    }
                    Err(e) => {
                        return Err(e).with_context(|| format!("Failed to merge '{}'.", input.display()));
                    }
                }
            }

            let Some(merged) = aggregate.finalize()? else {
                bail!("None of the {} inputs could be merged.", args.inputs.len());
            };
            write_output(args.output.as_deref(), &merged, out)?;
        }
    }

    Ok(())
}

fn read_input(path: &Path) -> anyhow::Result<Vec<u8>> {
    if path == Path::new("-") {
        let mut data = Vec::new();
        io::stdin()
            .lock()
            .read_to_end(&mut data)
            .context("Failed to read sketch from standard input.")?;
        return Ok(data);
    }

    fs::read(path).with_context(|| format!("Failed to read sketch from '{}'.", path.display()))
}

fn write_output<W: Write>(path: Option<&Path>, data: &[u8], out: &mut W) -> anyhow::Result<()> {
    match path {
        Some(path) if path != Path::new("-") => {
            fs::write(path, data).with_context(|| format!("Failed to write sketch to '{}'.", path.display()))
        }
        _ => out.write_all(data).context("Failed to write sketch to standard output."),
    }
}

fn write_scalar<W, T>(out: &mut W, format: OutputFormat, value: Option<T>) -> anyhow::Result<()>
where
    W: Write,
    T: std::fmt::Display + Serialize,
{
    match (format, value) {
        (OutputFormat::Text, Some(value)) => writeln!(out, "{}", value)?,
        (OutputFormat::Text, None) => writeln!(out, "NULL")?,
        (OutputFormat::Json, value) => writeln!(out, "{}", serde_json::to_string(&value)?)?,
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use std::path::PathBuf;

    use ddsketch_wire::MergePolicy;
    use tempfile::TempDir;

    use super::*;
    use crate::cli::{MergeArgs, MultiInput, QuantileArgs, SingleInput, SumArgs};

    // version = 1, gamma = 1.020202, sum = 8.8, count = 4, then buckets (5, 1), (40, 2), (60, 1).
    const SERIALIZED: [u8; 16] = [
        0x01, 0xfb, 0x95, 0x82, 0x3f, 0xcd, 0xcc, 0x0c, 0x41, 0x04, 0x05, 0x01, 0x23, 0x02, 0x14, 0x01,
    ];

    struct Fixture {
        dir: TempDir,
    }

    impl Fixture {
        fn new() -> Self {
            Self {
                dir: tempfile::tempdir().unwrap(),
            }
        }

        fn write(&self, name: &str, data: &[u8]) -> PathBuf {
            let path = self.dir.path().join(name);
            fs::write(&path, data).unwrap();
            path
        }

        fn path(&self, name: &str) -> PathBuf {
            self.dir.path().join(name)
        }
    }

    fn execute_to_string(action: Action, config: &Config) -> anyhow::Result<String> {
        let mut out = Vec::new();
        execute(action, config, &mut out)?;
        Ok(String::from_utf8(out).unwrap())
    }

    fn json_config() -> Config {
        Config {
            output: OutputFormat::Json,
            ..Config::default()
        }
    }

    #[test]
    fn inspect_and_json() {
        let fixture = Fixture::new();
        let input = fixture.write("a.bin", &SERIALIZED);

        let action = Action::Inspect(SingleInput { input: input.clone() });
        let inspected = execute_to_string(action, &Config::default()).unwrap();
        assert_eq!(
            inspected,
            "Sketch<version: 1, sum:8.8, count:4, gamma:1.020202, bucket_count: 3, buckets:{5: 1, 40: 2, 60: 1, }>\n"
        );

        let json = execute_to_string(Action::Json(SingleInput { input }), &Config::default()).unwrap();
        assert_eq!(
            json,
            "{\"version\":1,\"sum\":8.8,\"count\":4,\"gamma\":1.020202,\"buckets\":{\"5\":1,\"40\":2,\"60\":1}}\n"
        );
    }

    #[test]
    fn inspect_malformed_fails() {
        let fixture = Fixture::new();
        let input = fixture.write("bad.bin", &SERIALIZED[..5]);

        assert!(execute_to_string(Action::Inspect(SingleInput { input }), &Config::default()).is_err());
    }

    #[test]
    fn scalars_render_null_for_malformed_input() {
        let fixture = Fixture::new();
        let input = fixture.write("bad.bin", &[0x00]);

        let text = execute_to_string(Action::Count(SingleInput { input: input.clone() }), &Config::default()).unwrap();
        assert_eq!(text, "NULL\n");

        let json = execute_to_string(Action::Mean(SingleInput { input }), &json_config()).unwrap();
        assert_eq!(json, "null\n");
    }

    #[test]
    fn scalars() {
        let fixture = Fixture::new();
        let input = fixture.write("a.bin", &SERIALIZED);

        let count = execute_to_string(Action::Count(SingleInput { input: input.clone() }), &Config::default()).unwrap();
        assert_eq!(count, "4\n");

        let count = execute_to_string(Action::Count(SingleInput { input: input.clone() }), &json_config()).unwrap();
        assert_eq!(count, "4\n");

        let total = execute_to_string(Action::Total(SingleInput { input: input.clone() }), &Config::default()).unwrap();
        let total: f64 = total.trim().parse().unwrap();
        assert!((total - 8.8).abs() < 1e-5);

        let mean = execute_to_string(Action::Mean(SingleInput { input }), &Config::default()).unwrap();
        let mean: f64 = mean.trim().parse().unwrap();
        assert!((mean - 2.2).abs() < 1e-5);
    }

    #[test]
    fn quantile_respects_clamp_setting() {
        // Header count of 2 disagrees with the four observations held in the buckets.
        let mut data = SERIALIZED;
        data[9] = 0x02;

        let fixture = Fixture::new();
        let input = fixture.write("a.bin", &data);
        let quantile = |q: f64, config: &Config| {
            let action = Action::Quantile(QuantileArgs {
                q,
                input: input.clone(),
            });
            execute_to_string(action, config).unwrap()
        };

        let unclamped = Config {
            clamp_quantile: false,
            ..Config::default()
        };

        // Clamped, q = 3 becomes rank 2 and lands in bucket 40; unclamped, rank 6 runs past every bucket.
        assert_eq!(quantile(3.0, &Config::default()), quantile(0.75, &Config::default()));
        assert_ne!(quantile(3.0, &Config::default()), quantile(3.0, &unclamped));
        assert_eq!(quantile(-1.0, &unclamped), quantile(0.0, &Config::default()));
    }

    #[test]
    fn validate_reports_each_input() {
        let fixture = Fixture::new();
        let good = fixture.write("good.bin", &SERIALIZED);
        let bad = fixture.write("bad.bin", &SERIALIZED[..9]);

        let output = execute_to_string(
            Action::Validate(MultiInput {
                inputs: vec![good.clone()],
            }),
            &Config::default(),
        )
        .unwrap();
        assert_eq!(output, format!("{}: valid\n", good.display()));

        let mut out = Vec::new();
        let result = execute(
            Action::Validate(MultiInput {
                inputs: vec![good, bad.clone()],
            }),
            &json_config(),
            &mut out,
        );
        assert!(result.is_err());

        let out = String::from_utf8(out).unwrap();
        let last: serde_json::Value = serde_json::from_str(out.lines().last().unwrap()).unwrap();
        assert_eq!(last["input"], bad.display().to_string());
        assert_eq!(last["valid"], false);
    }

    #[test]
    fn merge_writes_output_file() {
        let fixture = Fixture::new();
        let left = fixture.write("left.bin", &SERIALIZED);
        let right = fixture.write("right.bin", &SERIALIZED);
        let output = fixture.path("merged.bin");

        execute_to_string(
            Action::Merge(MergeArgs {
                left: Some(left),
                right: Some(right),
                output: Some(output.clone()),
            }),
            &Config::default(),
        )
        .unwrap();

        let merged = fs::read(&output).unwrap();
        assert_eq!(ops::count(&merged), Some(8));
        assert_eq!(ops::total(&merged).map(|t| (t - 17.6).abs() < 1e-4), Some(true));
    }

    #[test]
    fn merge_passes_single_input_through() {
        let fixture = Fixture::new();
        let left = fixture.write("left.bin", &SERIALIZED);

        let mut out = Vec::new();
        execute(
            Action::Merge(MergeArgs {
                left: Some(left),
                right: None,
                output: None,
            }),
            &Config::default(),
            &mut out,
        )
        .unwrap();
        assert_eq!(out, SERIALIZED);
    }

    #[test]
    fn sum_skips_invalid_inputs_when_asked() {
        let fixture = Fixture::new();
        let a = fixture.write("a.bin", &SERIALIZED);
        let bad = fixture.write("bad.bin", &SERIALIZED[..11]);
        let b = fixture.write("b.bin", &SERIALIZED);

        let strict = Action::Sum(SumArgs {
            inputs: vec![a.clone(), bad.clone(), b.clone()],
            skip_invalid: false,
            output: None,
        });
        assert!(execute_to_string(strict, &Config::default()).is_err());

        let mut out = Vec::new();
        let lenient = Action::Sum(SumArgs {
            inputs: vec![a, bad, b],
            skip_invalid: true,
            output: None,
        });
        let config = Config {
            merge_policy: MergePolicy::Atomic,
            ..Config::default()
        };
        execute(lenient, &config, &mut out).unwrap();
        assert_eq!(ops::count(&out), Some(8));
    }

    #[test]
    fn sum_with_nothing_mergeable_fails() {
        let fixture = Fixture::new();
        let bad = fixture.write("bad.bin", &[0x01]);

        let action = Action::Sum(SumArgs {
            inputs: vec![bad],
            skip_invalid: true,
            output: None,
        });
        assert!(execute_to_string(action, &Config::default()).is_err());
    }
}
