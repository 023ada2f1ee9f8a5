//! LunarCrush 시간봉 수집기 CLI.

use std::sync::Arc;

use clap::{Parser, Subcommand};
use lunar_collector::modules::{Harvester, QuotaTracker};
use lunar_collector::{CollectorConfig, SystemClock};
use lunar_core::logging::{init_logging, LogConfig, LogFormat};
use lunar_data::{HarvestStore, LunarCrushClient, MetricsSource, PgHarvestStore};
use secrecy::ExposeSecret;
use sqlx::postgres::PgPoolOptions;
use tokio_util::sync::CancellationToken;

#[derive(Parser)]
#[command(name = "lunar-collector")]
#[command(about = "LunarCrush hourly time-series harvester", long_about = None)]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,

    /// 로그 레벨 (trace, debug, info, warn, error)
    #[arg(long, default_value = "info")]
    log_level: String,

    /// 로그 형식 (pretty, json, compact)
    #[arg(long, default_value = "compact")]
    log_format: LogFormat,

    /// 특정 심볼 ID만 수집 (쉼표로 구분, 예: "1,2,3")
    #[arg(long, value_delimiter = ',')]
    symbols: Vec<i64>,
}

#[derive(Subcommand)]
enum Commands {
    /// 중단 신호를 받을 때까지 수집 (기본)
    Run,

    /// 전체 심볼을 한 번 순회하고 종료
    Once,

    /// 현재 API 키 사용량 출력
    Quota,

    /// 테이블/뷰 생성
    InitSchema,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // 로깅 초기화
    init_logging(LogConfig::new(&cli.log_level).with_format(cli.log_format))
        .map_err(|e| anyhow::anyhow!("로깅 초기화 실패: {}", e))?;

    tracing::info!("LunarCrush Collector 시작");

    // 설정 로드
    let mut config = CollectorConfig::from_env()?;
    config.harvest.symbols = cli.symbols;
    tracing::debug!(provider = ?config.provider, quota = ?config.quota, "설정 로드 완료");

    // DB 연결
    let pool = PgPoolOptions::new()
        .max_connections(config.database_max_connections)
        .connect(&config.database_url)
        .await?;
    tracing::info!("데이터베이스 연결 성공");
    let store = PgHarvestStore::new(pool.clone());

    match cli.command.unwrap_or(Commands::Run) {
        Commands::InitSchema => {
            store.apply_schema().await?;
            tracing::info!("스키마 적용 완료");
        }
        Commands::Quota => {
            let tracker = QuotaTracker::new(
                config.quota.key_name.clone(),
                config.quota.limits,
                config.quota.waits,
            );
            let (snapshot, decision) = tracker.consult(&store, chrono::Utc::now()).await?;
            println!("{}", serde_json::to_string_pretty(&snapshot)?);
            tracing::info!(usage = tracker.usage(&snapshot), decision = ?decision, "쿼터 조회");
        }
        command @ (Commands::Run | Commands::Once) => {
            let source: Arc<dyn MetricsSource> = Arc::new(LunarCrushClient::new(
                config.provider.api_key.expose_secret(),
                config.provider.base_url.clone(),
                config.provider.timeout(),
            )?);
            let store: Arc<dyn HarvestStore> = Arc::new(store);
            let cancel = CancellationToken::new();

            let mut harvester = Harvester::new(
                store,
                source,
                Arc::new(SystemClock),
                config.quota.clone(),
                config.harvest.clone(),
                cancel.clone(),
            );

            let signal = tokio::spawn(async move {
                if tokio::signal::ctrl_c().await.is_ok() {
                    tracing::info!("종료 신호 수신, 진행 중인 커밋 후 종료합니다");
                    cancel.cancel();
                }
            });

            let stats = match command {
                Commands::Once => harvester.run_once().await?,
                _ => harvester.run().await?,
            };
            signal.abort();

            stats.log_summary("LunarCrush 수집");
            println!(
                "처리한 심볼: {}, 소요 시간: {:.1}s",
                stats.symbols_processed,
                stats.elapsed.as_secs_f64()
            );
        }
    }

    pool.close().await;
    tracing::info!("LunarCrush Collector 종료");

    Ok(())
}
