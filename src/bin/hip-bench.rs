//! hip-bench - Train and test the hippocampal encode/recall model
//!
//! # Usage
//!
//! ```bash
//! # Default experiment: pretrain, then AB training for 10 runs
//! hip-bench
//!
//! # Small config from file, 3 runs, then retrieval practice after each run
//! hip-bench --config small.json --runs 3 --protocol rp
//!
//! # Retrieval-practice parameter set, hippocampus only, save weights per run
//! hip-bench --params rp --hip-only --save-wts out/
//! ```
//!
//! # Exit Codes
//!
//! - 0: All runs finished
//! - 1: A run failed (topology, config or IO error during training)
//! - 2: Invalid arguments or unreadable config

use hipbench::{ParamSet, Phase, Protocol, SimConfig, Simulation};
use std::path::PathBuf;
use std::process::ExitCode;

struct Args {
    config: Option<PathBuf>,
    runs: Option<usize>,
    epochs: Option<usize>,
    seed: Option<u64>,
    params: Option<ParamSet>,
    protocol: Option<Protocol>,
    hip_only: bool,
    save_wts: Option<PathBuf>,
    load_wts: Option<PathBuf>,
    verbose: bool,
}

fn parse_args() -> Result<Option<Args>, String> {
    let mut args = Args {
        config: None,
        runs: None,
        epochs: None,
        seed: None,
        params: None,
        protocol: None,
        hip_only: false,
        save_wts: None,
        load_wts: None,
        verbose: false,
    };
    let mut it = std::env::args().skip(1);
    while let Some(arg) = it.next() {
        let mut value = |name: &str| it.next().ok_or_else(|| format!("{} needs a value", name));
        match arg.as_str() {
            "--config" | "-c" => args.config = Some(PathBuf::from(value(&arg[..])?)),
            "--runs" => args.runs = Some(parse_num(&arg, &value(&arg[..])?)?),
            "--epochs" => args.epochs = Some(parse_num(&arg, &value(&arg[..])?)?),
            "--seed" => args.seed = Some(parse_num(&arg, &value(&arg[..])?)?),
            "--params" => {
                let v = value(&arg[..])?;
                args.params = Some(ParamSet::from_name(&v).ok_or_else(|| format!("Unknown param set: {}", v))?);
            }
            "--protocol" | "-p" => {
                let v = value(&arg[..])?;
                args.protocol = Some(Protocol::from_name(&v).ok_or_else(|| format!("Unknown protocol: {}", v))?);
            }
            "--hip-only" => args.hip_only = true,
            "--save-wts" => args.save_wts = Some(PathBuf::from(value(&arg[..])?)),
            "--load-wts" => args.load_wts = Some(PathBuf::from(value(&arg[..])?)),
            "-v" | "--verbose" => args.verbose = true,
            "-h" | "--help" => return Ok(None),
            _ => return Err(format!("Unknown option: {}", arg)),
        }
    }
    Ok(Some(args))
}

fn parse_num<T: std::str::FromStr>(flag: &str, v: &str) -> Result<T, String> {
    v.parse().map_err(|_| format!("{} expects a number, got {}", flag, v))
}

fn main() -> ExitCode {
    let args = match parse_args() {
        Ok(Some(a)) => a,
        Ok(None) => {
            print_help();
            return ExitCode::SUCCESS;
        }
        Err(e) => {
            eprintln!("Error: {}\n", e);
            print_help();
            return ExitCode::from(2);
        }
    };

    let level = if args.verbose { "debug" } else { "info" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level)).init();

    let mut cfg = match &args.config {
        Some(path) => match SimConfig::load(path) {
            Ok(c) => c,
            Err(e) => {
                eprintln!("Error: {}: {}", path.display(), e);
                return ExitCode::from(2);
            }
        },
        None => SimConfig::default(),
    };
    if let Some(n) = args.runs {
        cfg.run.runs = n;
    }
    if let Some(n) = args.epochs {
        cfg.run.max_epochs = n;
    }
    if let Some(s) = args.seed {
        cfg.run.seed = s;
    }
    if let Some(p) = args.params {
        cfg.run.param_set = p;
    }
    cfg.run.hip_only |= args.hip_only;

    match run(cfg, &args) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {:#}", e);
            ExitCode::FAILURE
        }
    }
}

fn run(cfg: SimConfig, args: &Args) -> anyhow::Result<()> {
    let runs = cfg.run.runs;
    let follow_up = match args.protocol {
        None | Some(Protocol::EncodeRecall) | Some(Protocol::PreTrain) => None,
        Some(p) => Some(Phase::from_protocol(p)),
    };
    let mut sim = Simulation::new(cfg)?;
    if let Some(dir) = &args.save_wts {
        std::fs::create_dir_all(dir)?;
    }

    println!("Running {} runs", runs);
    for r in 0..runs {
        if r > 0 {
            sim.next_run()?;
        }
        match &args.load_wts {
            Some(path) => sim.load_weights(path)?,
            None if sim.config().run.pre_train_epochs > 0 => {
                sim.pre_train()?;
            }
            None => {}
        }
        let Some(rec) = sim.train_run()? else {
            println!("Stopped during run {}", r);
            break;
        };
        let test = match follow_up {
            Some(phase) => {
                sim.run_phase(phase)?;
                Some(sim.test_all()?)
            }
            None => rec.last_test,
        };
        let test = match test {
            Some(t) => t,
            None => sim.test_all()?,
        };
        println!(
            "run {:>2}: epochs={:>3} first_zero={:>4} mem={:.3} fn={:.3} fp={:.3}",
            rec.run,
            rec.epochs,
            rec.first_zero.map_or_else(|| "-".to_string(), |e| e.to_string()),
            test.mem,
            test.trg_on_was_off,
            test.trg_off_was_on
        );
        if let Some(dir) = &args.save_wts {
            let path = dir.join(format!("{}_run{}.wts.json", sim.network().name(), rec.run));
            sim.save_weights(&path)?;
            println!("Saved weights to {}", path.display());
        }
    }
    Ok(())
}

fn print_help() {
    eprintln!("hip-bench - Hippocampal encode/recall benchmark");
    eprintln!();
    eprintln!("USAGE:");
    eprintln!("    hip-bench [OPTIONS]");
    eprintln!();
    eprintln!("OPTIONS:");
    eprintln!("    -c, --config <FILE>     JSON config (defaults used for missing fields)");
    eprintln!("        --runs <N>          Number of runs");
    eprintln!("        --epochs <N>        Maximum training epochs per run");
    eprintln!("        --seed <N>          Base random seed");
    eprintln!("        --params <NAME>     Parameter set: base, rp");
    eprintln!("    -p, --protocol <NAME>   Phase after AB training: rp, rpae, restudy, ae");
    eprintln!("        --hip-only          Silence the cortical route to Output");
    eprintln!("        --save-wts <DIR>    Save final weights of each run");
    eprintln!("        --load-wts <FILE>   Start each run from saved weights instead of pretraining");
    eprintln!("    -v, --verbose           Debug logging");
    eprintln!("    -h, --help              Print this help message");
    eprintln!();
    eprintln!("EXIT CODES:");
    eprintln!("    0    All runs finished");
    eprintln!("    1    A run failed");
    eprintln!("    2    Invalid arguments or unreadable config");
}
