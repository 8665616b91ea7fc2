//! `ragachat init`: Write a default configuration.

use ragachat_config::AppConfig;

pub async fn run() -> Result<(), Box<dyn std::error::Error>> {
    let config_dir = AppConfig::config_dir();
    let config_path = config_dir.join("config.toml");

    println!("ragachat: First-Time Setup");
    println!("===========================\n");

    if !config_dir.exists() {
        std::fs::create_dir_all(&config_dir)?;
        println!("✅ Created config directory: {}", config_dir.display());
    } else {
        println!("  Config directory exists: {}", config_dir.display());
    }

    let knowledge_dir = config_dir.join("knowledge");
    if !knowledge_dir.exists() {
        std::fs::create_dir_all(&knowledge_dir)?;
        println!("✅ Created knowledge directory: {}", knowledge_dir.display());
    }

    if config_path.exists() {
        println!("\n⚠️  Config already exists at: {}", config_path.display());
        println!("   Edit it manually or delete and re-run init.\n");
        return Ok(());
    }

    std::fs::write(&config_path, AppConfig::default_toml())?;
    println!("✅ Created config.toml at: {}", config_path.display());
    println!("\n📝 Next steps:");
    println!("   1. Set COHERE_API_KEY and GEMINI_API_KEY (or edit the config file)");
    println!(
        "   2. Drop .txt / .md files into {} and run: ragachat ingest {}",
        knowledge_dir.display(),
        knowledge_dir.display()
    );
    println!("   3. Run: ragachat serve\n");

    Ok(())
}
