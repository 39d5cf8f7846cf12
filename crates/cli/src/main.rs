mod config;

use anyhow::Context;
use bridge::{ActivityThread, InProcessHost};
use clap::{Parser, Subcommand};
use common::package::methods;
use common::{RemoteHandle, ServiceIdentity, Value};
use config::HookConfig;
use hook::{HookController, Side};
use policy::{normalize_archive_path, AbiPreference, DeclaredArchiveParser, PackageMetadataPolicy, PolicyError};
use std::path::{Path, PathBuf};
use std::sync::Arc;

#[derive(Parser)]
#[command(name = "binder-hook")]
#[command(about = "Package-manager handle interception, simulated in-process", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Report which native-library ABI each package archive provides for this host.
    Inspect {
        /// Archive, or directory searched recursively for `.apk` files.
        path: PathBuf,
    },
    /// Activate the hook on a simulated host, run the configured queries, restore.
    Simulate {
        /// TOML file with [hook], [host] and [[query]] sections.
        #[arg(long)]
        config: PathBuf,
    },
}

fn main() -> anyhow::Result<()> {
    if let Err(e) = dotenvy::dotenv() {
        eprintln!("warning: .env: {}", e);
    }
    init_tracing();

    let cli = Cli::parse();
    match &cli.command {
        Commands::Inspect { path } => cmd_inspect(path)?,
        Commands::Simulate { config } => cmd_simulate(config)?,
    }

    Ok(())
}

/// Applied on top of `RUST_LOG`.
const DEFAULT_DIRECTIVES: &[&str] = &[
    "binder_hook=info",
    "hook=info",
    "policy=warn",
    "bridge=warn",
    "dispatch=warn",
];

fn init_tracing() {
    let mut filter = tracing_subscriber::EnvFilter::from_default_env();
    for directive in DEFAULT_DIRECTIVES {
        if let Ok(directive) = directive.parse() {
            filter = filter.add_directive(directive);
        }
    }
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

// ---------------------------------------------------------------------------
// inspect
// ---------------------------------------------------------------------------

fn cmd_inspect(path: &Path) -> anyhow::Result<()> {
    let preference = AbiPreference::host();
    let archives = collect_apk_files(path)?;

    println!("+------------------------------------------+");
    println!("| ARCHIVE ABI INSPECTION                   |");
    println!("+------------------------------------------+");
    println!("| Archives       : {:>22} |", archives.len());
    println!("| Host bitness   : {:>22} |", if preference.is_64bit { "64-bit" } else { "32-bit" });
    println!("| Candidates     : {:>22} |", preference.candidates().join(","));
    println!("+------------------------------------------+");

    if archives.is_empty() {
        println!("No package archives found.");
        return Ok(());
    }
    for archive in &archives {
        match policy::scan_archive(archive, &preference) {
            Ok(abi) => println!("  {} -> lib/{}", archive.display(), abi),
            Err(e @ PolicyError::AbiNotFound { .. }) => println!("  {} -> none ({})", archive.display(), e),
            Err(e) => println!("  {} -> unreadable ({})", archive.display(), e),
        }
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// simulate
// ---------------------------------------------------------------------------

/// Answer to one configured query.
#[derive(Debug, Clone, PartialEq)]
struct QueryOutcome {
    call: String,
    answer: String,
}

/// What one simulation observed while hooked and after restoring.
#[derive(Debug)]
struct Simulation {
    target: String,
    slots: Vec<(String, Option<Side>)>,
    hooked: Vec<QueryOutcome>,
    restored: Vec<QueryOutcome>,
    main_thread_restored: bool,
}

fn cmd_simulate(config_path: &Path) -> anyhow::Result<()> {
    let config = HookConfig::load(config_path)?;
    tracing::info!(config = %config_path.display(), target = %config.hook.target, "simulation loaded");
    let report = run_simulation(&config)?;

    println!("+------------------------------------------+");
    println!("| HOOK ACTIVE                              |");
    println!("+------------------------------------------+");
    println!("| Target         : {:>22} |", report.target);
    println!("| Queries        : {:>22} |", report.hooked.len());
    println!("+------------------------------------------+");
    for (slot, side) in &report.slots {
        let side = side.map(|s| format!("{:?}", s)).unwrap_or_else(|| "-".into());
        println!("  {:<40} {}", slot, side);
    }
    print_outcomes(&report.hooked);

    println!("\nRestored (main thread on original: {}).", report.main_thread_restored);
    print_outcomes(&report.restored);
    Ok(())
}

/// Builds the host from `config`, activates the hook, runs every query, then
/// restores and runs them again.
fn run_simulation(config: &HookConfig) -> anyhow::Result<Simulation> {
    let archive = normalize_archive_path(&config.hook.archive)
        .with_context(|| format!("archive for {}", config.hook.target))?;

    let host = Arc::new(InProcessHost::new(config.host.profile()?));
    let real = bridge::LocalPackageService::new();
    for installed in &config.host.installed {
        real.install(installed.to_package()?);
    }
    let real: RemoteHandle = real;
    host.register_service(&ServiceIdentity::new(methods::SERVICE), real.clone());
    // The main thread fetched the package manager before the hook existed.
    ActivityThread::new(host.as_ref()).set_package_manager(Some(real.clone()))?;

    let mut parser = DeclaredArchiveParser::new(config.hook.target.as_str());
    if let Some(version) = &config.hook.version_name {
        parser = parser.with_version(version.as_str(), config.hook.version_code);
    }
    let policy = PackageMetadataPolicy::new(
        config.hook.target.as_str(),
        archive,
        Arc::new(parser),
        host.clone(),
    )
    .with_abi_preference(config.host.abi_preference())
    .with_installer(config.hook.installer.as_str());

    let mut controller =
        HookController::package_manager(host.clone(), host.application_context(), Arc::new(policy));
    let binder = controller.activate()?;
    let slots = controller.slot_report();
    let hooked = run_queries(host.as_ref(), config, binder.proxy())?;

    controller.restore()?;
    let main_thread = ActivityThread::new(host.as_ref()).package_manager()?;
    let main_thread_restored = main_thread.is_some_and(|pm| common::same_handle(&pm, &real));
    let restored = run_queries(host.as_ref(), config, binder.proxy())?;

    Ok(Simulation {
        target: config.hook.target.clone(),
        slots,
        hooked,
        restored,
        main_thread_restored,
    })
}

/// Issues every query through the main thread's package manager.
fn run_queries(
    host: &InProcessHost,
    config: &HookConfig,
    proxy: &RemoteHandle,
) -> anyhow::Result<Vec<QueryOutcome>> {
    let pm = ActivityThread::new(host)
        .package_manager()?
        .context("main-thread package manager is empty")?;
    let mut outcomes = Vec::with_capacity(config.queries.len());
    for query in &config.queries {
        let call = query.to_call()?;
        let answer = match pm.transact(&call) {
            Ok(value) => describe(&value, proxy),
            Err(e) => format!("error: {}", e),
        };
        outcomes.push(QueryOutcome {
            call: call.sig().to_string(),
            answer,
        });
    }
    Ok(outcomes)
}

fn print_outcomes(outcomes: &[QueryOutcome]) {
    for outcome in outcomes {
        println!("  {} -> {}", outcome.call, outcome.answer);
    }
}

fn describe(value: &Value, proxy: &RemoteHandle) -> String {
    match value {
        Value::Null => "null".into(),
        Value::Package(info) => {
            let app = &info.application_info;
            format!(
                "{} (libs: {}, abi: {}, source: {})",
                info.package_name,
                app.native_library_dir.as_deref().unwrap_or("-"),
                app.primary_cpu_abi.as_deref().unwrap_or("-"),
                app.source_dir.as_deref().unwrap_or("-"),
            )
        }
        Value::Binder(handle) if common::same_handle(handle, proxy) => "binder (proxy)".into(),
        Value::Binder(handle) => format!("binder ({})", handle.descriptor()),
        other => format!("{:?}", other),
    }
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn collect_apk_files(path: &Path) -> anyhow::Result<Vec<PathBuf>> {
    use walkdir::WalkDir;
    if path.is_file() {
        return Ok(vec![path.to_path_buf()]);
    }
    if !path.exists() {
        anyhow::bail!("{} does not exist", path.display());
    }
    let mut files: Vec<PathBuf> = WalkDir::new(path)
        .follow_links(false)
        .into_iter()
        .filter_map(|e| e.ok())
        .filter(|e| {
            e.file_type().is_file() && e.path().extension().and_then(|x| x.to_str()) == Some("apk")
        })
        .map(|e| e.path().to_path_buf())
        .collect();
    files.sort();
    Ok(files)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_collect_apk_files() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join("nested")).unwrap();
        std::fs::write(dir.path().join("a.apk"), b"").unwrap();
        std::fs::write(dir.path().join("nested/b.apk"), b"").unwrap();
        std::fs::write(dir.path().join("notes.txt"), b"").unwrap();

        let files = collect_apk_files(dir.path()).unwrap();
        assert_eq!(files.len(), 2);
        assert!(files.iter().all(|f| f.extension().unwrap() == "apk"));

        let single = collect_apk_files(&dir.path().join("a.apk")).unwrap();
        assert_eq!(single.len(), 1);
        assert!(collect_apk_files(&dir.path().join("missing")).is_err());
    }

    const SIGNED_WEBVIEW: [&str; 4] = [
        "AndroidManifest.xml",
        "META-INF/CERT.RSA",
        "lib/arm64-v8a/libwebviewchromium.so",
        "lib/armeabi-v7a/libwebviewchromium.so",
    ];

    fn write_apk(path: &Path, entries: &[&str]) {
        use std::io::Write;
        use zip::write::SimpleFileOptions;

        let mut zip = zip::ZipWriter::new(std::fs::File::create(path).unwrap());
        let options = SimpleFileOptions::default().compression_method(zip::CompressionMethod::Stored);
        for entry in entries {
            zip.start_file(*entry, options).unwrap();
            zip.write_all(entry.as_bytes()).unwrap();
        }
        zip.finish().unwrap();
    }

    const SIMULATION: &str = r#"
[hook]
target = "com.google.android.webview"
archive = "webview.apk"

[host]
is_64bit = true
supported_64_bit = ["arm64-v8a"]
supported_32_bit = ["armeabi-v7a"]

[[host.installed]]
package = "com.example.app"
installer = "com.example.store"

[[query]]
method = "getPackageInfo"
package = "com.google.android.webview"
flags = 64

[[query]]
method = "getInstallerPackageName"
package = "com.google.android.webview"

[[query]]
method = "getInstallerPackageName"
package = "com.example.app"

[[query]]
method = "asBinder"
"#;

    #[test]
    fn test_simulation_substitutes_then_restores() {
        let dir = tempfile::tempdir().unwrap();
        write_apk(&dir.path().join("webview.apk"), &SIGNED_WEBVIEW);
        let path = dir.path().join("hook.toml");
        std::fs::write(&path, SIMULATION).unwrap();

        let report = run_simulation(&HookConfig::load(&path).unwrap()).unwrap();
        assert_eq!(report.target, "com.google.android.webview");
        assert_eq!(report.slots.len(), 2);
        assert!(report.slots.iter().all(|(_, side)| *side == Some(Side::Proxy)));

        let hooked: Vec<&str> = report.hooked.iter().map(|o| o.answer.as_str()).collect();
        assert!(hooked[0].starts_with("com.google.android.webview (libs: "));
        assert!(hooked[0].contains("webview.apk!/lib/arm64-v8a"));
        assert!(hooked[0].contains("abi: arm64-v8a"));
        assert!(hooked[1].contains(policy::DEFAULT_INSTALLER));
        assert!(hooked[2].contains("com.example.store"));
        assert_eq!(hooked[3], "binder (proxy)");

        assert!(report.main_thread_restored);
        let restored: Vec<&str> = report.restored.iter().map(|o| o.answer.as_str()).collect();
        assert_eq!(restored[0], "null");
        assert!(restored[1].starts_with("error: "));
        assert_eq!(restored[2], hooked[2]);
        assert_eq!(restored[3], format!("binder ({})", methods::DESCRIPTOR));
        assert_eq!(report.restored[0].call, report.hooked[0].call);
    }

    #[test]
    fn test_simulation_missing_archive() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("hook.toml");
        std::fs::write(&path, SIMULATION).unwrap();

        let err = run_simulation(&HookConfig::load(&path).unwrap()).unwrap_err();
        assert!(err.to_string().contains("archive for com.google.android.webview"));
    }

    #[test]
    fn test_demo_config_runs() {
        let path = Path::new(env!("CARGO_MANIFEST_DIR")).join("../../demos/hook.toml");
        let config = HookConfig::load(&path).unwrap();
        let report = run_simulation(&config).unwrap();

        assert_eq!(report.hooked.len(), config.queries.len());
        // The demo host lacks the primary ABI field; the library path is still set.
        assert!(report.hooked[0].answer.contains("!/lib/arm64-v8a"));
        assert!(report.hooked[0].answer.contains("abi: -"));
        assert!(report.main_thread_restored);
    }

    #[test]
    fn test_default_directives_cover_library_crates() {
        for directive in DEFAULT_DIRECTIVES {
            assert!(
                directive.parse::<tracing_subscriber::filter::Directive>().is_ok(),
                "{directive}"
            );
        }
        for krate in ["hook", "policy", "bridge", "dispatch"] {
            assert!(DEFAULT_DIRECTIVES.iter().any(|d| d.starts_with(&format!("{krate}="))));
        }
    }

    #[test]
    fn test_describe_values() {
        let proxy: RemoteHandle = bridge::LocalPackageService::new();
        assert_eq!(describe(&Value::Null, &proxy), "null");
        assert_eq!(describe(&Value::Binder(proxy.clone()), &proxy), "binder (proxy)");
        assert_eq!(describe(&Value::Int(2), &proxy), "Int(2)");
    }
}
