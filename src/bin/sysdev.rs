use anyhow::bail;
use clap::Parser;
use sysdev::registry::Context;

/// List devices from the system registry.
#[derive(Parser)]
#[command(version, about)]
struct Opts {
    /// Only devices in this subsystem (repeatable; alternatives)
    #[arg(long)]
    subsystem: Vec<String>,

    /// Exclude devices in this subsystem (repeatable)
    #[arg(long)]
    exclude_subsystem: Vec<String>,

    /// Only devices with this system name (repeatable; alternatives)
    #[arg(long)]
    sys_name: Vec<String>,

    /// KEY=VALUE property filter (repeatable; alternatives)
    #[arg(long)]
    property: Vec<String>,

    /// NAME=VALUE sysfs attribute filter (repeatable; all must hold)
    #[arg(long)]
    attribute: Vec<String>,

    /// Tag filter (repeatable; all must hold)
    #[arg(long)]
    tag: Vec<String>,

    /// Print properties and tags for each device
    #[arg(short, long)]
    verbose: bool,
}

fn split_pair(raw: &str) -> anyhow::Result<(&str, &str)> {
    match raw.split_once('=') {
        Some(pair) => Ok(pair),
        None => bail!("expected KEY=VALUE, got {raw:?}"),
    }
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt::init();

    let opts = Opts::parse();
    let context = Context::new();
    let mut devices = context.list_devices();

    for subsystem in &opts.subsystem {
        devices.match_subsystem(subsystem.as_str());
    }
    for subsystem in &opts.exclude_subsystem {
        devices.nomatch_subsystem(subsystem.as_str());
    }
    for sys_name in &opts.sys_name {
        devices.match_sys_name(sys_name.as_str());
    }
    for raw in &opts.property {
        let (key, value) = split_pair(raw)?;
        devices.match_property(key, value);
    }
    for raw in &opts.attribute {
        let (name, value) = split_pair(raw)?;
        devices.match_attribute(name, value);
    }
    for tag in &opts.tag {
        devices.match_tag(tag.as_str())?;
    }

    for device in devices.scan()? {
        let device = device?;
        println!("P: {}", device.syspath());
        if opts.verbose {
            for (key, value) in device.properties() {
                println!("E: {key}={value}");
            }
            for tag in device.tags() {
                println!("G: {tag}");
            }
            println!();
        }
    }

    Ok(())
}
