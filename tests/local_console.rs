use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use chrono::NaiveDate;
use tokio::sync::mpsc;
use ulid::Ulid;

use reeltime::backend::{Backend, LocalStore};
use reeltime::calendar::{CalendarDate, ManualClock};
use reeltime::model::*;
use reeltime::notify::{NotifyHub, Topic};
use reeltime::scheduler::{Scheduler, Trigger};
use reeltime::service::{PriceListService, VoucherService};

fn d(m: u32, day: u32) -> CalendarDate {
    NaiveDate::from_ymd_opt(2024, m, day).unwrap()
}

fn journal_path() -> PathBuf {
    let dir = std::env::temp_dir().join(format!("reeltime_int_test_{}", Ulid::new()));
    std::fs::create_dir_all(&dir).unwrap();
    dir.join("reeltime.journal")
}

fn draft(code: &str, start: CalendarDate, end: CalendarDate) -> PriceListDraft {
    PriceListDraft {
        code: code.into(),
        name: code.into(),
        interval: Interval::new(start, end),
        lines: vec![PriceLine {
            id: format!("{code}-combo").into(),
            item: ItemRef::Combo { code: "POP-L".into() },
            price_minor: 120_000,
        }],
    }
}

fn coupon_line(id: &str, interval: Interval) -> PromotionLine {
    PromotionLine {
        id: id.into(),
        interval,
        status: VoucherStatus::Enabled,
        rule: LineRule {
            stacking: StackingPolicy::Stackable,
        },
        offer: Offer::Voucher(PointsCoupon {
            points_cost: 500,
            remaining: 20,
            percent: 10,
            max_discount_minor: 50_000,
        }),
    }
}

#[tokio::test]
async fn timeline_survives_restart() {
    let path = journal_path();
    let clock = Arc::new(ManualClock::new(d(1, 1)));
    {
        let store: Arc<dyn Backend> = Arc::new(LocalStore::open(&path).unwrap());
        let prices = PriceListService::new(store, clock.clone(), Arc::new(NotifyHub::new()));
        let jan = prices.create(draft("STD", d(1, 1), d(3, 31))).await.unwrap();
        prices
            .split_version(&jan.id, d(1, 31), d(2, 1), d(3, 31), None)
            .await
            .unwrap();
    }

    let store: Arc<dyn Backend> = Arc::new(LocalStore::open(&path).unwrap());
    let notify = Arc::new(NotifyHub::new());
    let mut updates = notify.subscribe(Topic::PriceLists);
    let prices = PriceListService::new(store, clock, notify);
    let lists = prices.refresh().await.unwrap();
    assert_eq!(lists.len(), 2);
    assert_eq!(lists[1].code, "STD-20240201");
    assert_eq!(lists[1].lines, lists[0].lines);
    assert_eq!(updates.recv().await.unwrap().count, 2);
    assert!(!prices.gap_report().await.unwrap().has_gap);
}

#[tokio::test(start_paused = true)]
async fn scheduler_keeps_vouchers_in_step_with_the_calendar() {
    let store = Arc::new(LocalStore::open(&journal_path()).unwrap());
    let clock = Arc::new(ManualClock::new(d(1, 15)));

    let spring = Interval::new(d(1, 1), d(1, 31));
    let spring_v2 = Interval::new(d(1, 10), d(2, 10));
    let first = store
        .create_voucher("SPRING".into(), "Spring".into(), spring, vec![coupon_line("l1", spring)])
        .await
        .unwrap();
    let second = store
        .create_voucher("SPRING2".into(), "Spring v2".into(), spring_v2, vec![coupon_line("l2", spring_v2)])
        .await
        .unwrap();
    assert!(second.id > first.id);

    let service = Arc::new(VoucherService::new(store.clone(), clock.clone(), Arc::new(NotifyHub::new())));
    // Vouchers start disabled; the operator switches both on.
    service.set_status(&first.id, VoucherStatus::Enabled).await.unwrap();
    service.set_status(&second.id, VoucherStatus::Enabled).await.unwrap();

    let (obs_tx, mut obs_rx) = mpsc::unbounded_channel();
    let handle = Scheduler::spawn_with_observer(service.clone(), Duration::from_secs(60), Some(obs_tx));
    obs_rx.recv().await.unwrap();

    let status = |id: &EntityId| {
        service
            .latest()
            .data
            .iter()
            .find(|v| &v.id == id)
            .map(|v| v.status)
            .unwrap()
    };
    assert_eq!(status(&first.id), VoucherStatus::Disabled);
    assert_eq!(status(&second.id), VoucherStatus::Enabled);

    // Past the end of the second voucher's window.
    clock.set(d(2, 10));
    handle.notify(Trigger::FocusRegained);
    let report = obs_rx.recv().await.unwrap();
    assert_eq!(report.outcome.unwrap().out_of_window, 1);
    assert_eq!(status(&second.id), VoucherStatus::Disabled);

    store.delete_voucher(&first.id).await.unwrap();
    handle.notify(Trigger::Navigation);
    obs_rx.recv().await.unwrap();
    assert_eq!(service.latest().data.len(), 1);

    handle.shutdown().await;
}
