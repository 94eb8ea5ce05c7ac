use std::fs::File;
use std::io::{BufReader, BufWriter};
use std::path::Path;

use noi_migrate::{noi_engine, Dump, NoiConfig};
use noi_store::{ImportDb, MemoryStore};
use serde_json::json;

type Result = std::result::Result<(), Box<dyn std::error::Error>>;

fn load_config(path: Option<&str>) -> std::result::Result<NoiConfig, Box<dyn std::error::Error>> {
    match path {
        Some(path) => Ok(NoiConfig::load(Path::new(path))?),
        None => Ok(NoiConfig::default()),
    }
}

fn read_dump(path: &str) -> std::result::Result<Dump, Box<dyn std::error::Error>> {
    let file = File::open(path).map_err(|e| format!("cannot open {path}: {e}"))?;
    let dump = Dump::from_reader(BufReader::new(file))?;
    tracing::debug!(path, version = %dump.version, rows = dump.rows.len(), "dump read");
    Ok(dump)
}

/// `noi chain`: List the registered steps and validate the chain.
pub fn chain(config: Option<&str>) -> Result {
    let config = load_config(config)?;
    let engine = noi_engine(&config.site)?;

    println!("Running schema: v{}", engine.current_version());
    println!();
    println!("  {:<12} {:<12} {}", "From", "To", "Change");
    println!("  {}", "-".repeat(60));
    for step in engine.chain() {
        println!(
            "  {:<12} {:<12} {}",
            step.source_version().to_string(),
            step.target_version().to_string(),
            step.summary()
        );
    }
    println!();
    println!("Chain is contiguous ({} steps).", engine.chain().count());
    Ok(())
}

/// `noi inspect <dump>`: Show version, row counts and migration path.
pub fn inspect(dump_path: &str, config: Option<&str>) -> Result {
    let config = load_config(config)?;
    let engine = noi_engine(&config.site)?;
    let dump = read_dump(dump_path)?;

    println!("Dump: {dump_path}");
    println!("Version: v{}", dump.version);
    println!("Rows: {}", format_num(dump.rows.len() as u64));
    println!();

    if !dump.rows.is_empty() {
        println!("  {:<32} {:>10}", "Kind", "Rows");
        println!("  {}", "-".repeat(43));
        for (kind, count) in dump.kind_counts() {
            println!("  {:<32} {:>10}", kind, format_num(count as u64));
        }
        println!();
    }

    if !engine.needs_migration(&dump.version) {
        println!("Up to date with v{}.", engine.current_version());
        return Ok(());
    }
    let path = engine.plan(&dump.version)?;
    println!("Migration path ({} steps):", path.len());
    for step in path {
        println!(
            "  v{} -> v{}  {}",
            step.source_version(),
            step.target_version(),
            step.summary()
        );
    }
    Ok(())
}

/// `noi migrate <dump>`: Import into a memory store and report.
pub fn migrate(dump_path: &str, config: Option<&str>, export: Option<&str>) -> Result {
    let config = load_config(config)?;
    let dump = read_dump(dump_path)?;
    let mut db = ImportDb::from_config(MemoryStore::new(), &config)?;

    let report = db.import(dump)?;

    println!(
        "Migrated v{} -> v{} ({} steps)",
        report.source_version,
        report.target_version,
        report.steps.len()
    );
    println!(
        "Rows read: {}, entities written: {}, rows dropped: {}",
        format_num(report.rows_read as u64),
        format_num(report.entities_written() as u64),
        format_num(report.dropped as u64)
    );
    println!();

    let info = db.store().db_info();
    println!("  {:<32} {:>10} {:>10}", "Model", "Entities", "Size");
    println!("  {}", "-".repeat(54));
    for ns in &info.namespaces {
        println!(
            "  {:<32} {:>10} {:>10}",
            ns.name,
            format_num(ns.entity_count),
            format_bytes(ns.bytes)
        );
    }
    println!("  {}", "-".repeat(54));
    println!(
        "  {:<32} {:>10} {:>10}",
        "Total",
        format_num(info.total_entities),
        format_bytes(info.total_bytes)
    );

    if !report.recovered.is_empty() {
        println!();
        println!("Placeholders created for missing references:");
        for r in &report.recovered {
            println!("  {} #{} (referenced by {})", r.model, r.id, r.referenced_by);
        }
    }

    if let Some(path) = export {
        let mut entities = Vec::new();
        for model in db.models()? {
            entities.extend(db.entities(&model)?.iter().map(|e| e.to_json()));
        }
        let count = entities.len();
        let output = json!({
            "version": report.target_version.as_str(),
            "entities": entities,
        });
        let file = File::create(path).map_err(|e| format!("cannot create {path}: {e}"))?;
        serde_json::to_writer_pretty(BufWriter::new(file), &output)?;
        println!();
        println!("Exported {} entities to {path}", format_num(count as u64));
    }

    Ok(())
}

// ── Helpers ──────────────────────────────────────────────────────────

fn format_bytes(bytes: u64) -> String {
    if bytes < 1024 {
        format!("{bytes} B")
    } else if bytes < 1024 * 1024 {
        format!("{:.1} KB", bytes as f64 / 1024.0)
    } else {
        format!("{:.1} MB", bytes as f64 / (1024.0 * 1024.0))
    }
}

fn format_num(n: u64) -> String {
    let s = n.to_string();
    let mut result = String::new();
    for (i, ch) in s.chars().rev().enumerate() {
        if i > 0 && i % 3 == 0 {
            result.push(',');
        }
        result.push(ch);
    }
    result.chars().rev().collect()
}
