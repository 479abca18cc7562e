//! 모의 브로커 통합 테스트
//!
//! 스냅샷 파일 로드부터 trait 객체를 통한 변경 요청까지 확인합니다.

use std::io::Write;

use rust_decimal_macros::dec;
use sentinel_core::{BrokerGateway, BrokerSnapshot, MutationRequest, PaperBroker, Side, Timeframe};

const SNAPSHOT: &str = r#"{
    "equity": "10150",
    "balance": "10000",
    "positions": [
        {
            "id": "5001",
            "symbol": "EURUSD",
            "side": "buy",
            "volume": "0.30",
            "entry_price": "1.1000",
            "current_price": "1.1050",
            "stop_loss": "1.0950",
            "open_time": "2026-03-02T08:00:00Z",
            "floating_profit": "150"
        }
    ],
    "symbols": [
        {
            "symbol": "EURUSD",
            "pip_size": "0.0001",
            "tick_size": "0.00001",
            "tick_value": "1",
            "contract_size": "100000",
            "min_stop_distance": "0.0005",
            "min_volume": "0.01",
            "volume_step": "0.01"
        }
    ],
    "candles": {
        "EURUSD": [
            {"time": "2026-03-02T07:45:00Z", "open": "1.1000", "high": "1.1010", "low": "1.0990", "close": "1.1005"},
            {"time": "2026-03-02T08:00:00Z", "open": "1.1005", "high": "1.1055", "low": "1.1000", "close": "1.1050"}
        ]
    }
}"#;

fn load_snapshot() -> BrokerSnapshot {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    file.write_all(SNAPSHOT.as_bytes()).unwrap();
    BrokerSnapshot::from_file(file.path()).unwrap()
}

#[test]
fn test_snapshot_file_roundtrip_through_gateway() {
    let broker = PaperBroker::new(load_snapshot());
    let gateway: &dyn BrokerGateway = &broker;

    assert_eq!(gateway.account_equity().unwrap(), dec!(10150));
    assert_eq!(gateway.account_balance().unwrap(), dec!(10000));
    assert_eq!(gateway.min_stop_distance("EURUSD").unwrap(), dec!(0.0005));
    // 등록되지 않은 심볼은 표준 외환 사양
    assert_eq!(gateway.pip_size("GBPJPY").unwrap(), dec!(0.01));

    let positions = gateway.open_positions().unwrap();
    assert_eq!(positions.len(), 1);
    assert_eq!(positions[0].side, Side::Buy);
    assert!(positions[0].is_profitable());

    let candles = gateway.candles("EURUSD", Timeframe::M15, 1).unwrap();
    assert_eq!(candles.len(), 1);
    assert_eq!(candles[0].close, dec!(1.1050));
    assert!(candles[0].volume.is_zero());
}

#[test]
fn test_mutations_are_applied_and_recorded() {
    let mut broker = PaperBroker::new(load_snapshot());

    {
        let gateway: &mut dyn BrokerGateway = &mut broker;
        gateway.close_position("5001", dec!(0.15)).unwrap();
        gateway.modify_stop("5001", dec!(1.1002)).unwrap();
        assert!(gateway.close_position("404", dec!(0.01)).is_err());
    }

    assert_eq!(
        broker.requests(),
        &[
            MutationRequest::Close {
                position_id: "5001".to_string(),
                volume: dec!(0.15),
            },
            MutationRequest::ModifyStop {
                position_id: "5001".to_string(),
                new_stop: dec!(1.1002),
            },
        ]
    );

    let position = &broker.open_positions().unwrap()[0];
    assert_eq!(position.volume, dec!(0.15));
    assert_eq!(position.stop_loss, Some(dec!(1.1002)));
}
