//! 配置文件生成工具

use wavesync::config::{create_default_config, ConfigPaths};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let default_config = create_default_config();

    let json_content = serde_json::to_string_pretty(&default_config)?;

    println!("=== 默认配置文件内容 ===");
    println!("{}", json_content);

    let paths = ConfigPaths::new()?;
    let config_path = paths.config_file();
    if tokio::fs::try_exists(&config_path).await? {
        println!("\n=== 配置文件已存在，未覆盖: {:?} ===", config_path);
        return Ok(());
    }

    paths.ensure_config_dir().await?;
    tokio::fs::write(&config_path, json_content).await?;

    println!("\n=== 配置文件已保存到: {:?} ===", config_path);

    Ok(())
}
