use anyhow::{Context, Result};
use clap::{Arg, ArgMatches, Command};
use scheduler_api::auth::{hash_api_key, ApiKeyService};
use scheduler_api::{AppState, Request, ResponseCode, SchedulerApi};
use scheduler_core::{init_logging, AppConfig};
use tokio::io::AsyncReadExt;
use tracing::{info, warn};

#[tokio::main]
async fn main() -> Result<()> {
    let matches = Command::new("scheduler-admin")
        .version("1.0.0")
        .about("集群调度器变更控制核心的管理工具")
        .subcommand_required(true)
        .arg(
            Arg::new("config")
                .short('c')
                .long("config")
                .value_name("FILE")
                .global(true)
                .help("配置文件路径，未指定时查找默认位置"),
        )
        .arg(
            Arg::new("log-level")
                .short('l')
                .long("log-level")
                .value_name("LEVEL")
                .global(true)
                .help("日志级别，覆盖配置文件")
                .value_parser(["trace", "debug", "info", "warn", "error"]),
        )
        .arg(
            Arg::new("log-format")
                .long("log-format")
                .value_name("FORMAT")
                .global(true)
                .help("日志格式，覆盖配置文件")
                .value_parser(["json", "pretty"]),
        )
        .subcommand(
            Command::new("run")
                .about("按顺序分发请求文件中的请求并输出响应")
                .arg(
                    Arg::new("requests")
                        .short('r')
                        .long("requests")
                        .value_name("FILE")
                        .help("JSON请求数组文件，\"-\" 表示标准输入")
                        .default_value("-"),
                ),
        )
        .subcommand(
            Command::new("hash-key")
                .about("计算API密钥在配置中的存储形式")
                .arg(Arg::new("key").value_name("KEY").required(true)),
        )
        .subcommand(Command::new("generate-key").about("生成新的随机API密钥"))
        .get_matches();

    match matches.subcommand() {
        Some(("run", sub)) => run(&matches, sub).await,
        Some(("hash-key", sub)) => {
            let key = sub
                .get_one::<String>("key")
                .context("缺少API密钥参数")?;
            println!("{}", hash_api_key(key));
            Ok(())
        }
        Some(("generate-key", _)) => {
            let key = ApiKeyService::generate_api_key();
            println!("key:      {key}");
            println!("key_hash: {}", hash_api_key(&key));
            Ok(())
        }
        _ => Err(anyhow::anyhow!("未知的子命令")),
    }
}

async fn run(matches: &ArgMatches, sub: &ArgMatches) -> Result<()> {
    let config_path = matches.get_one::<String>("config").map(String::as_str);
    let mut config = AppConfig::load(config_path)
        .with_context(|| format!("加载配置失败: {}", config_path.unwrap_or("<默认位置>")))?;

    if let Some(level) = matches.get_one::<String>("log-level") {
        config.observability.log_level = level.clone();
    }
    if let Some(format) = matches.get_one::<String>("log-format") {
        config.observability.log_format = format.clone();
    }
    init_logging(&config.observability)?;

    let source = sub
        .get_one::<String>("requests")
        .map(String::as_str)
        .unwrap_or("-");
    let requests = read_requests(source).await?;
    info!("从 {} 读取了 {} 个请求", source, requests.len());

    let state = AppState::from_config(&config)
        .await
        .context("装配调度器状态失败")?;
    let api = SchedulerApi::new(state);

    let mut failures = 0usize;
    for request in requests {
        let operation = request.operation();
        let response = api.dispatch(request).await;
        if response.response_code != ResponseCode::Ok {
            failures += 1;
            warn!("{} 返回 {:?}: {}", operation, response.response_code, response.message());
        }
        let rendered = serde_json::to_string_pretty(&response).context("序列化响应失败")?;
        println!("{rendered}");
    }

    info!("请求处理完成, 非OK响应 {} 个", failures);
    Ok(())
}

async fn read_requests(source: &str) -> Result<Vec<Request>> {
    let raw = if source == "-" {
        let mut buffer = String::new();
        tokio::io::stdin()
            .read_to_string(&mut buffer)
            .await
            .context("读取标准输入失败")?;
        buffer
    } else {
        tokio::fs::read_to_string(source)
            .await
            .with_context(|| format!("读取请求文件失败: {source}"))?
    };

    serde_json::from_str(&raw).context("解析请求失败，需要JSON数组")
}
