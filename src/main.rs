//! kurapak - list and extract Unreal `.pak` archives, inspect `.uasset` headers

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use walkdir::WalkDir;

use kurapak::{
    AesKey, DirectorySink, ExtractionSession, ObjectRef, PackageIndex, PakArchive, PakOptions,
    UAsset, UAssetOptions,
};

#[derive(Parser, Debug)]
#[command(name = "kurapak")]
#[command(about = "Reader for Unreal .pak archives and .uasset package headers")]
#[command(version)]
struct Args {
    #[command(subcommand)]
    command: Commands,

    /// AES-256 key (64 hex digits or base64) for encrypted archives
    #[arg(long, global = true, env = "KURAPAK_AES_KEY", hide_env_values = true)]
    aes_key: Option<String>,

    /// Fail on hash mismatches instead of warning
    #[arg(long, global = true)]
    strict: bool,

    /// More log output (-v debug, -vv trace)
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    verbose: u8,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// List the entries of an archive
    List { pak: PathBuf },

    /// Extract an archive, or every .pak found below a directory
    Extract {
        input: PathBuf,

        /// Output directory; archives found in a directory get a subdirectory each
        #[arg(short, long, default_value = "extracted")]
        output: PathBuf,

        /// Only extract paths containing this string (can specify multiple, OR logic)
        #[arg(short, long)]
        filter: Vec<String>,

        /// Worker threads (default: available parallelism)
        #[arg(short, long)]
        jobs: Option<usize>,
    },

    /// Print the summary, names, imports and exports of a .uasset
    Inspect {
        uasset: PathBuf,

        /// Companion .uexp holding the export payloads
        #[arg(long)]
        uexp: Option<PathBuf>,

        /// Object version assumed for unversioned packages
        #[arg(long, default_value_t = 522)]
        ue4_version: i32,
    },
}

fn main() -> Result<()> {
    let args = Args::parse();

    let level = match args.verbose {
        0 => "info",
        1 => "debug",
        _ => "trace",
    };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level)).init();

    let key = args
        .aes_key
        .as_deref()
        .map(str::parse::<AesKey>)
        .transpose()
        .context("invalid AES key")?;
    let options = PakOptions::new().maybe_key(key).strict(args.strict);

    match args.command {
        Commands::List { pak } => list(&pak, options),
        Commands::Extract {
            input,
            output,
            filter,
            jobs,
        } => extract(&input, &output, &filter, jobs, options),
        Commands::Inspect {
            uasset,
            uexp,
            ue4_version,
        } => inspect(&uasset, uexp.as_deref(), UAssetOptions { ue4_version }),
    }
}

fn open(pak: &Path, options: PakOptions) -> Result<PakArchive> {
    PakArchive::open(pak, options).with_context(|| format!("failed to open {}", pak.display()))
}

fn list(pak: &Path, options: PakOptions) -> Result<()> {
    let archive = open(pak, options)?;
    println!(
        "{}: version {:?}, mount point {:?}, {} entries{}",
        pak.display(),
        archive.version(),
        archive.mount_point(),
        archive.entries().len(),
        if archive.is_index_encrypted() {
            ", encrypted index"
        } else {
            ""
        }
    );
    for entry in archive.entries() {
        let hash = entry.hash.map(hex::encode).unwrap_or_default();
        println!(
            "{:>12} {:>12} {:<6} {}{} {hash}",
            entry.uncompressed_size,
            entry.compressed_size,
            entry.compression.to_string(),
            entry.path,
            if entry.is_encrypted { " [encrypted]" } else { "" },
        );
    }
    Ok(())
}

fn find_paks(input: &Path, output: &Path) -> Vec<(PathBuf, PathBuf)> {
    if !input.is_dir() {
        return vec![(input.to_path_buf(), output.to_path_buf())];
    }
    let mut paks: Vec<_> = WalkDir::new(input)
        .into_iter()
        .filter_map(|e| e.ok())
        .filter(|e| e.file_type().is_file())
        .filter(|e| {
            e.path()
                .extension()
                .is_some_and(|ext| ext.eq_ignore_ascii_case("pak"))
        })
        .map(|e| {
            let stem = e.path().file_stem().unwrap_or_default().to_owned();
            (e.into_path(), output.join(stem))
        })
        .collect();
    paks.sort();
    paks
}

fn extract(
    input: &Path,
    output: &Path,
    filters: &[String],
    jobs: Option<usize>,
    options: PakOptions,
) -> Result<()> {
    let paks = find_paks(input, output);
    if paks.is_empty() {
        bail!("no .pak files found in {}", input.display());
    }

    let mut failed_entries = 0;
    let mut failed_archives = 0;
    for (pak, destination) in &paks {
        let archive = match open(pak, options.clone()) {
            Ok(archive) => archive,
            Err(e) if paks.len() > 1 => {
                log::error!("{e:#}");
                failed_archives += 1;
                continue;
            }
            Err(e) => return Err(e),
        };

        fs::create_dir_all(destination)
            .with_context(|| format!("failed to create {}", destination.display()))?;

        let progress = |done: usize, total: usize, path: &str| {
            log::debug!("[{done}/{total}] {path}");
        };
        let mut session = ExtractionSession::new(&archive).progress(&progress);
        if !filters.is_empty() {
            session = session.filter(|entry| filters.iter().any(|f| entry.path.contains(f.as_str())));
        }
        if let Some(jobs) = jobs {
            session = session.workers(jobs);
        }
        let report = session.run(&DirectorySink::new(destination));

        for failure in &report.failures {
            eprintln!("Error {}: {}", failure.path, failure.error);
        }
        println!(
            "{}: extracted {} of {} entries ({} bytes) to {}",
            pak.display(),
            report.succeeded,
            report.attempted,
            report.extracted_bytes,
            destination.display()
        );
        failed_entries += report.failed;
    }

    if failed_entries > 0 || failed_archives > 0 {
        bail!("{failed_entries} entries and {failed_archives} archives failed");
    }
    Ok(())
}

fn object_name(asset: &UAsset, index: PackageIndex) -> String {
    let name = match index.resolve() {
        ObjectRef::Null => return "null".to_owned(),
        ObjectRef::Import(i) => asset.imports.get(i).map(|import| &import.object_name),
        ObjectRef::Export(i) => asset.exports.get(i).map(|export| &export.object_name),
    };
    name.and_then(|name| asset.name(name))
        .unwrap_or_else(|| format!("<{}>", index.0))
}

fn inspect(path: &Path, uexp: Option<&Path>, options: UAssetOptions) -> Result<()> {
    let bytes = fs::read(path).with_context(|| format!("failed to read {}", path.display()))?;
    let asset = UAsset::parse_with(&bytes, &options)
        .with_context(|| format!("failed to parse {}", path.display()))?;
    let uexp = uexp
        .map(|uexp| fs::read(uexp).with_context(|| format!("failed to read {}", uexp.display())))
        .transpose()?;

    let header = &asset.header;
    println!("{}", path.display());
    println!(
        "  legacy version {}, ue4 {} (stored {}), licensee {}, {} custom versions",
        header.legacy_file_version,
        asset.ue4_version(),
        header.file_version_ue4,
        header.file_version_licensee_ue4,
        header.custom_versions.len()
    );
    println!(
        "  header size {}, folder {:?}, package flags {:#010x}",
        header.total_header_size, header.folder_name, header.package_flags
    );

    println!("names ({}):", asset.names.len());
    for (i, name) in asset.names.iter().enumerate() {
        println!("  {i:>5} {name}");
    }

    println!("imports ({}):", asset.imports.len());
    for (i, import) in asset.imports.iter().enumerate() {
        println!(
            "  {:>5} {}.{} {} (outer {})",
            -(i as i64) - 1,
            asset.name(&import.class_package).unwrap_or_default(),
            asset.name(&import.class_name).unwrap_or_default(),
            asset.name(&import.object_name).unwrap_or_default(),
            object_name(&asset, import.outer_index)
        );
    }

    println!("exports ({}):", asset.exports.len());
    for (i, export) in asset.exports.iter().enumerate() {
        println!(
            "  {:>5} {} class {} outer {} serial {}+{}",
            i + 1,
            asset.name(&export.object_name).unwrap_or_default(),
            object_name(&asset, export.class_index),
            object_name(&asset, export.outer_index),
            export.serial_offset,
            export.serial_size
        );
        if let Some(uexp) = &uexp {
            match asset.export_data(export, uexp) {
                Ok(data) => println!(
                    "        {}",
                    hex::encode(&data[..data.len().min(32)])
                ),
                Err(e) => println!("        {e}"),
            }
        }
    }
    Ok(())
}
