//! Command-line surface and validated supervisor configuration.

use std::num::NonZeroUsize;
use std::path::PathBuf;

use clap::Parser;
use serde::{Deserialize, Serialize};

use crate::error::SupervisorError;
use crate::partition::{SearchRange, WorkerAssignment};
use crate::status::DEFAULT_STATUS_DIR;

/// Command-line arguments.
///
/// The short flags mirror the worker binary's own surface so operators can
/// move between the two without relearning them.
#[derive(Parser, Debug)]
#[command(name = "opsweep")]
#[command(about = "Fuzzer front-end: spreads an instruction-space search over worker processes and shows live fleet progress")]
pub struct SupervisorArgs {
    /// Search range start (hex encoding)
    #[arg(short = 's', long, value_name = "INSN", value_parser = parse_hex_u32, default_value = "0")]
    pub start: u32,

    /// Search range end (hex encoding)
    #[arg(short = 'e', long, value_name = "INSN", value_parser = parse_hex_u32, default_value = "ffffffff")]
    pub end: u32,

    /// Number of worker processes (0 means one per CPU core)
    #[arg(short = 'w', long, value_name = "NUM", default_value_t = 0)]
    pub workers: usize,

    /// Log disassembler discrepancies
    #[arg(short = 'd', long)]
    pub discreps: bool,

    /// Test instructions under ptrace
    #[arg(short = 'p', long)]
    pub ptrace: bool,

    /// Disassemble instructions without executing them
    #[arg(short = 'n', long)]
    pub no_exec: bool,

    /// Instruction filter level
    #[arg(short = 'f', long, value_name = "LEVEL", default_value_t = 0)]
    pub filter: u32,

    /// Use the thumb instruction set
    #[arg(short = 't', long)]
    pub thumb: bool,

    /// Load registers with random values instead of zeroes
    #[arg(short = 'z', long)]
    pub random: bool,

    /// Log only the registers a hidden instruction changed
    #[arg(short = 'g', long)]
    pub log_reg_changes: bool,

    /// Set and log vector registers while fuzzing
    #[arg(short = 'V', long)]
    pub vector: bool,

    /// Set cpsr flags to match the instruction's condition code
    #[arg(short = 'c', long)]
    pub cond: bool,

    /// Worker binary to launch
    #[arg(long, value_name = "PATH", default_value = "./fuzzer")]
    pub worker_bin: PathBuf,

    /// Supervisor log verbosity: error, warn, info, debug, trace
    #[arg(long, value_name = "LEVEL", default_value = "info")]
    pub log_level: String,
}

fn parse_hex_u32(s: &str) -> Result<u32, String> {
    let digits = s
        .strip_prefix("0x")
        .or_else(|| s.strip_prefix("0X"))
        .unwrap_or(s);
    u32::from_str_radix(digits, 16).map_err(|e| format!("not a hex encoding: {e}"))
}

/// Feature flags forwarded to every worker invocation.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FuzzerOptions {
    pub discreps: bool,
    pub ptrace: bool,
    pub no_exec: bool,
    pub filter_level: u32,
    pub thumb: bool,
    pub random_regs: bool,
    pub log_reg_changes: bool,
    pub vector: bool,
    pub cond: bool,
}

impl FuzzerOptions {
    /// Argv for one worker: its index, hex sub-range bounds, the enabled
    /// feature flags, then quiet mode. `-f` is only passed for a positive
    /// filter level, joined to its value as the worker expects.
    pub fn build_worker_args(&self, assignment: &WorkerAssignment) -> Vec<String> {
        let mut args = vec![
            "-l".to_string(),
            assignment.id.to_string(),
            "-s".to_string(),
            format!("{:#x}", assignment.range.start),
            "-e".to_string(),
            format!("{:#x}", assignment.range.end),
        ];
        if self.discreps {
            args.push("-d".to_string());
        }
        if self.ptrace {
            args.push("-p".to_string());
        }
        if self.no_exec {
            args.push("-n".to_string());
        }
        if self.filter_level > 0 {
            args.push(format!("-f{}", self.filter_level));
        }
        if self.thumb {
            args.push("-t".to_string());
        }
        if self.random_regs {
            args.push("-z".to_string());
        }
        if self.log_reg_changes {
            args.push("-g".to_string());
        }
        if self.vector {
            args.push("-V".to_string());
        }
        if self.cond {
            args.push("-c".to_string());
        }
        args.push("-q".to_string());
        args
    }
}

/// Validated configuration for one run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SupervisorConfig {
    pub range: SearchRange,
    pub workers: usize,
    pub fuzzer: FuzzerOptions,
    pub worker_bin: PathBuf,
    pub status_dir: PathBuf,
    pub log_level: String,
}

impl TryFrom<SupervisorArgs> for SupervisorConfig {
    type Error = SupervisorError;

    fn try_from(args: SupervisorArgs) -> Result<Self, Self::Error> {
        let range = SearchRange::new(args.start, args.end)?;
        let workers = if args.workers == 0 {
            std::thread::available_parallelism()
                .map(NonZeroUsize::get)
                .unwrap_or(1)
        } else {
            args.workers
        };

        Ok(Self {
            range,
            workers,
            fuzzer: FuzzerOptions {
                discreps: args.discreps,
                ptrace: args.ptrace,
                no_exec: args.no_exec,
                filter_level: args.filter,
                thumb: args.thumb,
                random_regs: args.random,
                log_reg_changes: args.log_reg_changes,
                vector: args.vector,
                cond: args.cond,
            },
            worker_bin: args.worker_bin,
            status_dir: PathBuf::from(DEFAULT_STATUS_DIR),
            log_level: args.log_level,
        })
    }
}
