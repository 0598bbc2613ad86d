use std::fs::{File, OpenOptions};
use std::process;
use std::time::Instant;

use clap::{Parser, Subcommand, ValueEnum};
use memmap2::MmapMut;
use tracing_subscriber::EnvFilter;

use bytedelta::{
    apply_placed_inplace_to, apply_placed_to, decode_delta, diff, encode_delta, make_inplace,
    place_commands, placed_summary, unplace_commands, Algorithm, CyclePolicy, DeltaError,
    DiffOptions,
};

// ── CLI argument types ───────────────────────────────────────────────────

#[derive(Clone, Copy, ValueEnum)]
enum AlgorithmArg {
    Greedy,
    Onepass,
    Correcting,
}

impl From<AlgorithmArg> for Algorithm {
    fn from(a: AlgorithmArg) -> Self {
        match a {
            AlgorithmArg::Greedy => Algorithm::Greedy,
            AlgorithmArg::Onepass => Algorithm::Onepass,
            AlgorithmArg::Correcting => Algorithm::Correcting,
        }
    }
}

#[derive(Clone, Copy, ValueEnum)]
enum PolicyArg {
    Localmin,
    Constant,
}

impl From<PolicyArg> for CyclePolicy {
    fn from(p: PolicyArg) -> Self {
        match p {
            PolicyArg::Localmin => CyclePolicy::LocalMin,
            PolicyArg::Constant => CyclePolicy::Constant,
        }
    }
}

fn parse_seed_len(s: &str) -> Result<usize, String> {
    let n: usize = s.parse().map_err(|e| format!("{}", e))?;
    if n >= 1 {
        Ok(n)
    } else {
        Err("--seed-len must be >= 1".into())
    }
}

#[derive(Parser)]
#[command(name = "bytedelta", about = "Differential compression between byte files")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Compute a delta from reference and version files
    Encode {
        /// Differencing algorithm
        #[arg(value_enum)]
        algorithm: AlgorithmArg,

        /// Reference file
        reference: String,

        /// Version file
        version: String,

        /// Output delta file
        delta_file: String,

        /// Seed length: minimum match length and fingerprint window
        #[arg(long, default_value_t = bytedelta::SEED_LEN, value_parser = parse_seed_len)]
        seed_len: usize,

        /// Fingerprint table capacity floor
        #[arg(long, default_value_t = bytedelta::TABLE_SIZE)]
        table_size: usize,

        /// Lookback buffer capacity (correcting only)
        #[arg(long, default_value_t = bytedelta::LOOKBACK_CAP)]
        buf_cap: usize,

        /// Use the splay-tree index backing
        #[arg(long)]
        splay: bool,

        /// Produce an in-place reconstructible delta
        #[arg(long)]
        inplace: bool,

        /// Cycle-breaking policy for --inplace
        #[arg(long, value_enum, default_value_t = PolicyArg::Localmin)]
        policy: PolicyArg,

        /// Print diagnostics to stderr
        #[arg(long)]
        verbose: bool,
    },

    /// Reconstruct the version from reference and delta files
    Decode {
        /// Reference file
        reference: String,

        /// Delta file
        delta_file: String,

        /// Output (reconstructed version) file
        output: String,
    },

    /// Show delta file statistics without applying it
    Info {
        /// Delta file
        delta_file: String,
    },

    /// Convert a standard delta to an in-place delta without re-diffing
    Inplace {
        /// Reference file
        reference: String,

        /// Input (standard) delta file
        delta_in: String,

        /// Output (in-place) delta file
        delta_out: String,

        /// Cycle-breaking policy
        #[arg(long, value_enum, default_value_t = PolicyArg::Localmin)]
        policy: PolicyArg,

        /// Print diagnostics to stderr
        #[arg(long)]
        verbose: bool,
    },
}

// ── helpers ──────────────────────────────────────────────────────────────

fn init_tracing(verbose: bool) {
    let filter = if verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::from_default_env()
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .without_time()
        .init();
}

fn read_file(path: &str) -> Vec<u8> {
    std::fs::read(path).unwrap_or_else(|e| {
        eprintln!("error reading {}: {}", path, e);
        process::exit(1);
    })
}

fn write_file(path: &str, bytes: &[u8]) {
    std::fs::write(path, bytes).unwrap_or_else(|e| {
        eprintln!("error writing {}: {}", path, e);
        process::exit(1);
    });
}

fn fail(context: &str, err: DeltaError) -> ! {
    eprintln!("error {}: {}", context, err);
    process::exit(1);
}

/// Create a file of `size` bytes and map it read-write. `None` map for an
/// empty file.
fn mmap_create(path: &str, size: usize) -> std::io::Result<(File, Option<MmapMut>)> {
    let file = OpenOptions::new()
        .read(true)
        .write(true)
        .create(true)
        .truncate(true)
        .open(path)?;
    if size > 0 {
        file.set_len(size as u64)?;
        // SAFETY: freshly created and truncated; nothing else maps it.
        let mmap = unsafe { MmapMut::map_mut(&file)? };
        Ok((file, Some(mmap)))
    } else {
        Ok((file, None))
    }
}

// ── subcommands ──────────────────────────────────────────────────────────

fn run_encode(
    algorithm: AlgorithmArg,
    reference: &str,
    version: &str,
    delta_file: &str,
    opts: DiffOptions,
    inplace: bool,
    policy: PolicyArg,
) {
    let r = read_file(reference);
    let v = read_file(version);

    let algo: Algorithm = algorithm.into();
    let t0 = Instant::now();
    let commands = match diff(algo, &r, &v, &opts) {
        Ok(c) => c,
        Err(e) => fail("computing delta", e),
    };

    let pol: CyclePolicy = policy.into();
    let mut cycles_broken = 0usize;
    let placed = if inplace {
        match make_inplace(&r, &commands, pol) {
            Ok((placed, stats)) => {
                cycles_broken = stats.cycles_broken;
                placed
            }
            Err(e) => fail("converting to in-place", e),
        }
    } else {
        place_commands(&commands)
    };
    let elapsed = t0.elapsed();

    let delta_bytes = encode_delta(&placed, inplace, v.len());
    write_file(delta_file, &delta_bytes);

    let stats = placed_summary(&placed);
    let ratio = if v.is_empty() {
        0.0
    } else {
        delta_bytes.len() as f64 / v.len() as f64
    };
    let algo_name = format!("{:?}", algo).to_lowercase();
    let splay_tag = if opts.use_splay { " [splay]" } else { "" };
    if inplace {
        let pol_name = format!("{:?}", pol).to_lowercase();
        println!("Algorithm:    {}{} + in-place ({})", algo_name, splay_tag, pol_name);
    } else {
        println!("Algorithm:    {}{}", algo_name, splay_tag);
    }
    println!("Reference:    {} ({} bytes)", reference, r.len());
    println!("Version:      {} ({} bytes)", version, v.len());
    println!("Delta:        {} ({} bytes)", delta_file, delta_bytes.len());
    println!("Compression:  {:.4} (delta/version)", ratio);
    println!(
        "Commands:     {} copies, {} adds",
        stats.num_copies, stats.num_adds
    );
    if inplace {
        println!("Cycles broken: {}", cycles_broken);
    }
    println!("Copy bytes:   {}", stats.copy_bytes);
    println!("Add bytes:    {}", stats.add_bytes);
    println!("Time:         {:.3}s", elapsed.as_secs_f64());
}

fn run_decode(reference: &str, delta_file: &str, output: &str) {
    let r = read_file(reference);
    let delta_bytes = read_file(delta_file);

    let t0 = Instant::now();
    let (placed, is_ip, version_size) = match decode_delta(&delta_bytes) {
        Ok(d) => d,
        Err(e) => fail("decoding delta", e),
    };

    if is_ip {
        let buf_size = r.len().max(version_size);
        let (file, mmap) = mmap_create(output, buf_size).unwrap_or_else(|e| {
            eprintln!("error creating {}: {}", output, e);
            process::exit(1);
        });
        if let Some(mut mm) = mmap {
            mm[..r.len()].copy_from_slice(&r);
            if let Err(e) = apply_placed_inplace_to(&placed, &mut mm) {
                fail("applying delta", e);
            }
            mm.flush().unwrap_or_else(|e| {
                eprintln!("error flushing {}: {}", output, e);
                process::exit(1);
            });
            drop(mm);
            file.set_len(version_size as u64).unwrap_or_else(|e| {
                eprintln!("error truncating {}: {}", output, e);
                process::exit(1);
            });
        }
    } else {
        let (_file, mmap) = mmap_create(output, version_size).unwrap_or_else(|e| {
            eprintln!("error creating {}: {}", output, e);
            process::exit(1);
        });
        if let Some(mut mm) = mmap {
            if let Err(e) = apply_placed_to(&r, &placed, &mut mm) {
                fail("applying delta", e);
            }
            mm.flush().unwrap_or_else(|e| {
                eprintln!("error flushing {}: {}", output, e);
                process::exit(1);
            });
        }
    }
    let elapsed = t0.elapsed();

    let fmt = if is_ip { "in-place" } else { "standard" };
    println!("Format:       {}", fmt);
    println!("Reference:    {} ({} bytes)", reference, r.len());
    println!("Delta:        {} ({} bytes)", delta_file, delta_bytes.len());
    println!("Output:       {} ({} bytes)", output, version_size);
    println!("Time:         {:.3}s", elapsed.as_secs_f64());
}

fn run_info(delta_file: &str) {
    let delta_bytes = read_file(delta_file);
    let (placed, is_ip, version_size) = match decode_delta(&delta_bytes) {
        Ok(d) => d,
        Err(e) => fail("decoding delta", e),
    };

    let stats = placed_summary(&placed);
    let fmt = if is_ip { "in-place" } else { "standard" };
    println!("Delta file:   {} ({} bytes)", delta_file, delta_bytes.len());
    println!("Format:       {}", fmt);
    println!("Version size: {} bytes", version_size);
    println!("Commands:     {}", stats.num_commands);
    println!(
        "  Copies:     {} ({} bytes)",
        stats.num_copies, stats.copy_bytes
    );
    println!(
        "  Adds:       {} ({} bytes)",
        stats.num_adds, stats.add_bytes
    );
    println!("Output size:  {} bytes", stats.total_output_bytes);
}

fn run_inplace(reference: &str, delta_in: &str, delta_out: &str, policy: PolicyArg) {
    let r = read_file(reference);
    let delta_bytes = read_file(delta_in);

    let (placed, is_ip, version_size) = match decode_delta(&delta_bytes) {
        Ok(d) => d,
        Err(e) => fail("decoding delta", e),
    };

    if is_ip {
        write_file(delta_out, &delta_bytes);
        println!("Delta is already in-place format; copied unchanged.");
        return;
    }

    let t0 = Instant::now();
    let pol: CyclePolicy = policy.into();
    let commands = unplace_commands(&placed);
    let (ip_placed, ip_stats) = match make_inplace(&r, &commands, pol) {
        Ok(res) => res,
        Err(e) => fail("converting to in-place", e),
    };
    let elapsed = t0.elapsed();

    let ip_delta = encode_delta(&ip_placed, true, version_size);
    write_file(delta_out, &ip_delta);

    let stats = placed_summary(&ip_placed);
    let pol_name = format!("{:?}", pol).to_lowercase();
    println!("Reference:    {} ({} bytes)", reference, r.len());
    println!("Input delta:  {} ({} bytes)", delta_in, delta_bytes.len());
    println!("Output delta: {} ({} bytes)", delta_out, ip_delta.len());
    println!("Format:       in-place ({})", pol_name);
    println!(
        "Commands:     {} copies, {} adds",
        stats.num_copies, stats.num_adds
    );
    println!("CRWI edges:   {}", ip_stats.edges);
    println!("Cycles broken: {}", ip_stats.cycles_broken);
    if ip_stats.cycles_broken > 0 {
        println!("Materialized: {} bytes", ip_stats.bytes_materialized);
    }
    println!("Copy bytes:   {}", stats.copy_bytes);
    println!("Add bytes:    {}", stats.add_bytes);
    println!("Time:         {:.3}s", elapsed.as_secs_f64());
}

fn main() {
    let cli = Cli::parse();

    match cli.command {
        Commands::Encode {
            algorithm,
            reference,
            version,
            delta_file,
            seed_len,
            table_size,
            buf_cap,
            splay,
            inplace,
            policy,
            verbose,
        } => {
            init_tracing(verbose);
            let opts = DiffOptions {
                seed_len,
                table_size,
                buf_cap,
                use_splay: splay,
                verbose,
            };
            run_encode(
                algorithm,
                &reference,
                &version,
                &delta_file,
                opts,
                inplace,
                policy,
            );
        }
        Commands::Decode {
            reference,
            delta_file,
            output,
        } => {
            init_tracing(false);
            run_decode(&reference, &delta_file, &output);
        }
        Commands::Info { delta_file } => {
            init_tracing(false);
            run_info(&delta_file);
        }
        Commands::Inplace {
            reference,
            delta_in,
            delta_out,
            policy,
            verbose,
        } => {
            init_tracing(verbose);
            run_inplace(&reference, &delta_in, &delta_out, policy);
        }
    }
}
