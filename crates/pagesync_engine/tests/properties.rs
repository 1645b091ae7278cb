//! Property tests over random remote shapes and session operations.

use pagesync_engine::{
    Direction, Page, Pager, PagingSource, PagingState, RemoteFetcher, SyntheticFetcher,
};
use pagesync_store::Record;
use pagesync_testkit::{
    arb_remote_shape, arb_session_ops, cursor_violations, scenarios, RemoteShape, SessionOp,
};
use proptest::prelude::*;

fn runtime() -> tokio::runtime::Runtime {
    tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .expect("Failed to build runtime")
}

/// Position of a synthetic record in the whole remote sequence.
fn remote_index(record: &Record, page_size: u32) -> usize {
    let (page, item) = record
        .key
        .strip_prefix('p')
        .and_then(|rest| rest.split_once("/e"))
        .expect("synthetic key");
    let page: usize = page.parse().expect("page number");
    let item: usize = item.parse().expect("item number");
    (page - 1) * page_size as usize + (item - 1)
}

fn is_contiguous(items: &[Record], page_size: u32) -> bool {
    items
        .windows(2)
        .all(|pair| remote_index(&pair[1], page_size) == remote_index(&pair[0], page_size) + 1)
}

async fn apply<F: RemoteFetcher>(pager: &Pager<F>, op: &SessionOp) {
    match op {
        SessionOp::Refresh { anchor } => {
            if let Some(anchor) = anchor {
                pager.set_anchor(*anchor);
            }
            pager.refresh().await.unwrap();
        }
        SessionOp::LoadMore(direction) => pager.load_more(*direction).await.unwrap(),
        SessionOp::Access(position) => {
            pager.access(*position).await.unwrap();
        }
    }
}

async fn drain<F: RemoteFetcher>(pager: &Pager<F>, shape: &RemoteShape) {
    pager.refresh().await.unwrap();
    for _ in 0..=shape.last_page + 1 {
        if pager.snapshot().load_states.append.end_of_pagination() {
            break;
        }
        pager.load_more(Direction::Append).await.unwrap();
    }
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(48))]

    #[test]
    fn cached_session_keeps_cursors_and_order(
        shape in arb_remote_shape(),
        ops in arb_session_ops(12),
    ) {
        runtime().block_on(async {
            let (pager, _fetcher, store) =
                scenarios::cached_session(shape.fetcher(), shape.config());
            for op in &ops {
                apply(&pager, op).await;
                let violations = cursor_violations(&store);
                prop_assert!(violations.is_empty(), "after {:?}: {:?}", op, violations);
                prop_assert!(is_contiguous(&pager.snapshot().items, shape.page_size));
            }
            Ok::<(), TestCaseError>(())
        })?;
    }

    #[test]
    fn source_session_keeps_order(shape in arb_remote_shape(), ops in arb_session_ops(12)) {
        runtime().block_on(async {
            let (pager, _fetcher) = scenarios::source_session(shape.fetcher(), shape.config());
            for op in &ops {
                apply(&pager, op).await;
                prop_assert!(is_contiguous(&pager.snapshot().items, shape.page_size));
            }
            Ok::<(), TestCaseError>(())
        })?;
    }

    #[test]
    fn draining_presents_every_remote_record(shape in arb_remote_shape()) {
        runtime().block_on(async {
            let (cached, _fetcher, store) =
                scenarios::cached_session(shape.fetcher(), shape.config());
            drain(&cached, &shape).await;
            prop_assert_eq!(cached.snapshot().len(), shape.total_records());
            prop_assert_eq!(store.record_count(), shape.total_records());

            let (source, _fetcher) = scenarios::source_session(shape.fetcher(), shape.config());
            drain(&source, &shape).await;
            prop_assert_eq!(source.snapshot().len(), shape.total_records());
            prop_assert!(source.snapshot().load_states.append.end_of_pagination());
            Ok::<(), TestCaseError>(())
        })?;
    }

    #[test]
    fn refresh_key_reloads_page_under_anchor(
        first in 1u32..50,
        len in 1usize..6,
        pages in 1usize..6,
        anchor in 0usize..40,
    ) {
        let loaded: Vec<Page<u32, usize>> = (0..pages)
            .map(|i| {
                let page = first + i as u32;
                Page::new(vec![0; len], (page > 1).then(|| page - 1), Some(page + 1))
            })
            .collect();
        let expected = first + (anchor.min(len * pages - 1) / len) as u32;

        let state = PagingState::new(&loaded, Some(anchor));
        let key = PagingSource::<SyntheticFetcher>::refresh_key(state);
        prop_assert_eq!(key, Some(expected));
    }
}
