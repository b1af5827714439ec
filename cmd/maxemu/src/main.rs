use anyhow::{Context, bail};
use clap::{Parser, Subcommand, ValueEnum};
use pkg_constants::paths::USER_CONFIG_FILE;
use pkg_detect::{BlkidProbe, LabelProbe, NoLabel, collect_images, parse_iso};
use pkg_types::GuestInfo;
use pkg_types::config::{Bus, ConfigFile, load_config_file};
use pkg_vm::launcher;
use pkg_vm::{Host, VmPlan, VmSettings, VmStore};
use std::path::{Path, PathBuf};
use tracing::{debug, info};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

#[derive(Parser)]
#[command(
    name = "maxemu",
    about = "Generate and launch QEMU virtual machines from install images",
    version
)]
struct Cli {
    /// Path to YAML config file (default: <config dir>/maxemu/config.yaml)
    #[arg(long, short)]
    config: Option<PathBuf>,

    /// Directory holding the generated VMs (default: ~/maxemu)
    #[arg(long)]
    vm_home: Option<PathBuf>,

    /// Log filter, e.g. `debug` or `pkg_detect=debug`
    #[arg(long, env = "RUST_LOG", default_value = "info")]
    log: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Generate a VM, from an install image or bare-metal, and boot it
    Create(CreateArgs),
    /// Boot a previously generated VM
    Launch {
        /// VM name
        name: String,
    },
    /// List generated VMs
    #[command(name = "ls")]
    List,
    /// Delete a generated VM and its disk
    #[command(name = "rm")]
    Rm {
        /// VM name
        name: String,
    },
    /// Show what would be detected for install images
    Detect {
        /// ISO files or directories containing them
        #[arg(required = true)]
        paths: Vec<PathBuf>,
        /// Don't read volume labels
        #[arg(long, default_value_t = false)]
        no_label: bool,
    },
}

#[derive(clap::Args)]
struct CreateArgs {
    /// Install image to boot from
    #[arg(long, value_name = "ISO")]
    cdrom: Option<PathBuf>,
    /// VM name (default: derived from the image)
    #[arg(long)]
    name: Option<String>,
    /// Number of vCPUs
    #[arg(long)]
    cpus: Option<u32>,
    /// Guest memory, e.g. 4G
    #[arg(long)]
    memory: Option<String>,
    /// System disk size, e.g. 40G
    #[arg(long)]
    disk_size: Option<String>,
    /// Bus for the install image
    #[arg(long, value_enum)]
    cdrom_bus: Option<BusArg>,
    /// Bus for the system disk
    #[arg(long, value_enum)]
    disk_bus: Option<BusArg>,
    /// Don't read the image's volume label
    #[arg(long, default_value_t = false)]
    no_label: bool,
    /// Only generate the VM, don't boot it
    #[arg(long, default_value_t = false)]
    no_launch: bool,
}

#[derive(Clone, Copy, ValueEnum)]
enum BusArg {
    Scsi,
    Virtio,
}

impl From<BusArg> for Bus {
    fn from(arg: BusArg) -> Self {
        match arg {
            BusArg::Scsi => Bus::Scsi,
            BusArg::Virtio => Bus::Virtio,
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let filter = tracing_subscriber::EnvFilter::try_new(&cli.log)
        .with_context(|| format!("invalid log filter '{}'", cli.log))?;
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::fmt::layer()
                .compact()
                .with_target(false)
                .with_writer(std::io::stderr),
        )
        .with(filter)
        .init();

    // Merge: CLI args > config file > defaults
    let file_cfg: ConfigFile = match cli.config.clone().or_else(default_config_path) {
        Some(path) => {
            debug!("Config file: {}", path.display());
            load_config_file(&path)?
        }
        None => ConfigFile::default(),
    };

    let home = VmStore::resolve_home(
        cli.vm_home
            .clone()
            .or_else(|| file_cfg.vm_home.as_ref().map(PathBuf::from)),
    )?;
    debug!("VM home: {}", home.display());
    let store = VmStore::new(&home);

    match cli.command {
        Commands::Create(args) => cmd_create(&store, &file_cfg, args).await,
        Commands::Launch { name } => {
            let cmdline = store.load(&name).await?;
            info!("Launching {}", name);
            launcher::run(&cmdline, &store.vm_dir(&name)).await
        }
        Commands::List => cmd_list(&store).await,
        Commands::Rm { name } => {
            store.remove(&name).await?;
            println!("Removed {}", name);
            Ok(())
        }
        Commands::Detect { paths, no_label } => cmd_detect(&paths, no_label).await,
    }
}

fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|dir| dir.join(USER_CONFIG_FILE))
}

fn label_probe(no_label: bool) -> Box<dyn LabelProbe> {
    if no_label {
        Box::new(NoLabel)
    } else {
        Box::new(BlkidProbe)
    }
}

fn merge_settings(args: &CreateArgs, file: &ConfigFile) -> VmSettings {
    let defaults = VmSettings::default();
    VmSettings {
        cpus: args.cpus.or(file.cpus).unwrap_or(defaults.cpus),
        memory: args
            .memory
            .clone()
            .or_else(|| file.memory.clone())
            .unwrap_or(defaults.memory),
        disk_size: args
            .disk_size
            .clone()
            .or_else(|| file.disk_size.clone())
            .unwrap_or(defaults.disk_size),
        cdrom_bus: args
            .cdrom_bus
            .map(Bus::from)
            .or(file.cdrom_bus)
            .unwrap_or(defaults.cdrom_bus),
        disk_bus: args
            .disk_bus
            .map(Bus::from)
            .or(file.disk_bus)
            .unwrap_or(defaults.disk_bus),
        qemu_dir: file.qemu_dir.as_ref().map(PathBuf::from),
    }
}

async fn cmd_create(
    store: &VmStore,
    file_cfg: &ConfigFile,
    args: CreateArgs,
) -> anyhow::Result<()> {
    let host = Host::detect()?;
    let settings = merge_settings(&args, file_cfg);

    let install = match &args.cdrom {
        Some(iso) => {
            let probe = label_probe(args.no_label);
            Some(detect_install(iso, probe.as_ref()).await?)
        }
        None => None,
    };

    let plan = VmPlan::resolve(
        &host,
        store,
        install
            .as_ref()
            .map(|(guest, iso)| (guest.clone(), iso.as_path())),
        args.name.as_deref(),
        &settings,
    )?;

    let dir = store.create(&host, &plan).await?;
    println!("Created VM {} at {}", plan.name, dir.display());

    if args.no_launch {
        return Ok(());
    }
    launcher::launch(&dir).await
}

/// Detect the guest of an install image, refusing images that don't say
/// enough about it. Returns the image's absolute path for `vm.cfg`.
async fn detect_install(
    iso: &Path,
    probe: &dyn LabelProbe,
) -> anyhow::Result<(GuestInfo, PathBuf)> {
    std::fs::metadata(iso).with_context(|| format!("cannot access {}", iso.display()))?;

    // The name the user gave is what gets parsed, symlinks are not resolved.
    let guest = parse_iso(iso, probe).await?;
    if !guest.is_complete() {
        bail!(
            "invalid ISO image: {} (os='{}', version='{}', arch={})",
            iso.display(),
            guest.os_name,
            guest.os_version,
            guest
                .arch
                .map(|a| a.to_string())
                .unwrap_or_else(|| "?".to_string())
        );
    }

    // vm.cfg is run from the VM directory.
    let iso = std::path::absolute(iso)
        .with_context(|| format!("cannot resolve {}", iso.display()))?;
    info!(
        "Detected {} {} ({}) from {}",
        guest.os_name,
        guest.os_version,
        guest.arch.map(|a| a.to_string()).unwrap_or_default(),
        iso.display()
    );
    Ok((guest, iso))
}

async fn cmd_list(store: &VmStore) -> anyhow::Result<()> {
    let entries = store.list().await?;

    println!(
        "{:<32} {:<10} {:<8} {:<20} {}",
        "NAME", "ARCH", "MACHINE", "OS", "CREATED"
    );
    for entry in &entries {
        match &entry.record {
            Some(rec) => println!(
                "{:<32} {:<10} {:<8} {:<20} {}",
                entry.name,
                rec.arch,
                rec.machine,
                format!("{} {}", rec.os_name, rec.os_version).trim(),
                rec.created_at.format("%Y-%m-%d %H:%M:%S")
            ),
            None => println!("{:<32} {:<10} {:<8} {:<20} -", entry.name, "-", "-", "-"),
        }
    }

    if entries.is_empty() {
        println!("(no VMs in {})", store.home().display());
    }
    Ok(())
}

async fn cmd_detect(paths: &[PathBuf], no_label: bool) -> anyhow::Result<()> {
    let probe = label_probe(no_label);
    for iso in collect_images(paths)? {
        let guest = parse_iso(&iso, probe.as_ref()).await?;
        println!("{}", report_line(&iso, &guest));
    }
    Ok(())
}

fn report_line(iso: &Path, guest: &GuestInfo) -> String {
    format!(
        "{}: os={} version={} arch={}{}",
        display_name(iso),
        or_dash(&guest.os_name),
        or_dash(&guest.os_version),
        guest
            .arch
            .map(|a| a.to_string())
            .unwrap_or_else(|| "-".to_string()),
        if guest.is_complete() { "" } else { " (incomplete)" }
    )
}

fn display_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_else(|| path.display().to_string())
}

fn or_dash(s: &str) -> &str {
    if s.is_empty() { "-" } else { s }
}
