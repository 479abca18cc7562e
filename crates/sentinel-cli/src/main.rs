//! Sentinel 리스크 코어 CLI.
//!
//! 결과는 stdout에 JSON으로, 로그는 stderr로 출력합니다.
//!
//! # 사용 예시
//!
//! ```bash
//! # EURUSD 매수 제안 평가 (거부되면 종료 코드 2)
//! sentinel evaluate -s EURUSD --side buy -e 1.2000 -c data/eurusd_m15.json
//!
//! # 상위 타임프레임 캔들과 세션 후 잔고 비율 목표 사용
//! sentinel evaluate -s EURUSD --side sell -e 1.2000 -c m15.json --htf-candles h4.json \
//!     --balance 10000 --volume 0.10 --at 2026-01-06T21:30:00Z
//!
//! # 브로커 스냅샷으로 보호 틱 한 번 실행하고 결과 스냅샷 갱신
//! sentinel protect --snapshot broker.json --write-snapshot broker.json
//!
//! # 보호 상태 확인과 수동 세션 리셋
//! sentinel status
//! sentinel reset --equity 10000
//!
//! # 유효 설정 출력 (보수적 프리셋 위에 파일 적용)
//! sentinel --preset conservative --config config/live.toml config
//! ```

use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::Context;
use chrono::{DateTime, Utc};
use clap::{Parser, Subcommand};
use rust_decimal::Decimal;
use serde::Serialize;
use tracing::{error, info};

use sentinel_cli::commands::evaluate::{run_evaluate, EvaluateConfig};
use sentinel_cli::commands::protect::{run_protect, ProtectConfig};
use sentinel_cli::commands::state::{reset_session, show_status};
use sentinel_cli::{AppConfig, RiskPreset};
use sentinel_core::{init_logging, LogConfig, Side};

/// 거래가 거부되었거나 차단되었을 때의 종료 코드.
const EXIT_VETOED: u8 = 2;

#[derive(Parser)]
#[command(name = "sentinel")]
#[command(about = "Sentinel - 구조 기반 손절/목표 계산과 포지션 보호", long_about = None)]
#[command(version)]
struct Cli {
    /// 설정 파일 (기본: config/default.toml, 있을 때만)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// 리스크 설정 프리셋 (설정 파일과 환경 변수가 위에 덮어씀)
    #[arg(long, global = true, value_enum, default_value_t = RiskPreset::Standard)]
    preset: RiskPreset,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// 거래 제안 평가 (손절/목표 계산 → 손익비 검증)
    Evaluate {
        /// 심볼 (예: EURUSD, USDJPY)
        #[arg(short, long)]
        symbol: String,

        /// 거래 방향 (buy, sell)
        #[arg(long)]
        side: Side,

        /// 진입 가격
        #[arg(short, long)]
        entry: Decimal,

        /// 실행 타임프레임 캔들 JSON 파일
        #[arg(short = 'c', long)]
        candles: PathBuf,

        /// 상위 타임프레임 캔들 JSON 파일
        #[arg(long)]
        htf_candles: Option<PathBuf>,

        /// 심볼 사양 JSON 파일 (기본: 표준 외환 사양)
        #[arg(long)]
        spec: Option<PathBuf>,

        /// 평가 시각 (RFC 3339, 기본: 현재 시각)
        #[arg(long)]
        at: Option<DateTime<Utc>>,

        /// 계좌 잔고 (세션 후 목표 계산용)
        #[arg(long, requires = "volume")]
        balance: Option<Decimal>,

        /// 진입 거래량 (세션 후 목표 계산용)
        #[arg(long, requires = "balance")]
        volume: Option<Decimal>,

        /// 보호 상태의 신규 진입 차단 무시
        #[arg(long, default_value = "false")]
        ignore_block: bool,
    },

    /// JSON 브로커 스냅샷으로 보호 틱 한 번 실행
    Protect {
        /// 브로커 스냅샷 JSON 파일
        #[arg(long)]
        snapshot: PathBuf,

        /// 틱 시각 (RFC 3339, 기본: 현재 시각)
        #[arg(long)]
        at: Option<DateTime<Utc>>,

        /// 틱 전에 새 거래 진입을 알림
        #[arg(long, default_value = "false")]
        new_trade: bool,

        /// 변경이 반영된 스냅샷을 쓸 경로
        #[arg(long)]
        write_snapshot: Option<PathBuf>,
    },

    /// 저장된 보호 상태 출력
    Status,

    /// 보호 세션 수동 리셋
    Reset {
        /// 새 기준 평가금액
        #[arg(long)]
        equity: Decimal,

        /// 리셋 시각 (RFC 3339, 기본: 현재 시각)
        #[arg(long)]
        at: Option<DateTime<Utc>>,
    },

    /// 유효 설정을 TOML로 출력
    Config,
}

fn print_json<T: Serialize>(value: &T) -> anyhow::Result<()> {
    let rendered = serde_json::to_string_pretty(value).context("Failed to serialize output")?;
    println!("{}", rendered);
    Ok(())
}

fn run(cli: Cli, app: AppConfig) -> anyhow::Result<ExitCode> {
    let state_path = app.persistence.state_path.clone();

    match cli.command {
        Commands::Evaluate {
            symbol,
            side,
            entry,
            candles,
            htf_candles,
            spec,
            at,
            balance,
            volume,
            ignore_block,
        } => {
            let config = EvaluateConfig {
                candles_path: candles,
                htf_candles_path: htf_candles,
                spec_path: spec,
                symbol: symbol.to_uppercase(),
                side,
                entry,
                at,
                balance,
                volume,
                state_path: (!ignore_block).then_some(state_path),
            };

            let outcome = run_evaluate(&config, &app.risk)?;
            print_json(&outcome)?;
            if outcome.is_accepted() {
                Ok(ExitCode::SUCCESS)
            } else {
                Ok(ExitCode::from(EXIT_VETOED))
            }
        }

        Commands::Protect {
            snapshot,
            at,
            new_trade,
            write_snapshot,
        } => {
            let config = ProtectConfig {
                snapshot_path: snapshot,
                state_path,
                at,
                new_trade,
                write_snapshot,
            };
            let outcome = run_protect(&config, &app.risk.protection)?;
            print_json(&outcome)?;
            Ok(ExitCode::SUCCESS)
        }

        Commands::Status => {
            let status = show_status(&state_path, &app.risk.protection)?;
            print_json(&status)?;
            Ok(ExitCode::SUCCESS)
        }

        Commands::Reset { equity, at } => {
            let status = reset_session(&state_path, &app.risk.protection, equity, at)?;
            info!(baseline = %equity, "Session reset");
            print_json(&status)?;
            Ok(ExitCode::SUCCESS)
        }

        Commands::Config => {
            print!("{}", app.to_toml()?);
            Ok(ExitCode::SUCCESS)
        }
    }
}

fn main() -> ExitCode {
    dotenvy::dotenv().ok();

    let cli = Cli::parse();

    let app = match AppConfig::load_with_preset(cli.config.as_deref(), cli.preset) {
        Ok(app) => app,
        Err(e) => {
            eprintln!("Error: {:#}", e);
            return ExitCode::FAILURE;
        }
    };

    if let Err(e) = init_logging(LogConfig::from(&app.logging).overridden_by_env()) {
        eprintln!("Failed to initialize logging: {}", e);
        return ExitCode::FAILURE;
    }

    match run(cli, app) {
        Ok(code) => code,
        Err(e) => {
            error!(error = %e, "Command failed");
            eprintln!("Error: {:#}", e);
            ExitCode::FAILURE
        }
    }
}
