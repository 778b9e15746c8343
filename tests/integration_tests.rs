// tests/integration_tests.rs
// End-to-end tests over the listing store and comparable engine:
// capture-style upserts, analysis against the stored snapshot, and the
// import/export surface.

use deal_scout::engine;
use deal_scout::models::{AnalysisFilters, Listing, Source, Trim};
use deal_scout::store::{ListingStore, MemoryBackend, StoreBackend};
use deal_scout::transfer::{self, ImportMode};

fn captured(id: &str, price: i64) -> Listing {
    let mut l = Listing::new(id);
    l.brand = Some("skoda".to_string());
    l.model = Some("octavia".to_string());
    l.trim = Some(Trim::Standard);
    l.year = Some(2020);
    l.mileage_km = Some(50_000);
    l.price_eur = Some(price);
    l.captured_at = "2026-08-20T09:00:00+00:00".to_string();
    l
}

// ============================================================================
// CAPTURE -> STORE -> ANALYZE FLOW
// ============================================================================

mod analysis_flow {
    use super::*;

    #[tokio::test]
    async fn stored_listings_feed_the_engine() {
        let store = ListingStore::new(MemoryBackend::new());

        // capture twelve comparables plus the target, one batch per "page visit"
        for i in 0..12u32 {
            let comp = captured(
                &format!("https://cars.example/s-anzeige/octavia/{}", 7_000_000 + i),
                19_500 + i as i64 * 90,
            );
            store.upsert(&[comp]).await.unwrap();
        }
        let target = captured("https://cars.example/s-anzeige/octavia/7999999", 17_500);
        store.upsert(&[target.clone()]).await.unwrap();

        let snapshot = store.load_all().await.unwrap();
        assert_eq!(snapshot.len(), 13);

        let analysis = engine::analyze(&target, &snapshot, &AnalysisFilters::default());
        // the target itself sits in the snapshot but never counts
        assert_eq!(analysis.comparables_count, 12);
        assert!(!analysis.not_enough_data);
        // priced well below the ~20k cluster
        assert!(analysis.deal_score.unwrap() > 0.05);
    }

    #[tokio::test]
    async fn detail_recapture_enriches_without_losing_history() {
        let store = ListingStore::new(MemoryBackend::new());
        let id = "https://cars.example/s-anzeige/octavia/7100001";

        let mut search_capture = captured(id, 21_000);
        search_capture.price_history = vec![deal_scout::models::PricePoint {
            price_eur: 21_000,
            captured_at: search_capture.captured_at.clone(),
        }];
        store.upsert(&[search_capture]).await.unwrap();

        let mut detail_capture = Listing::new(id);
        detail_capture.source = Source::Detail;
        detail_capture.fuel = Some("Benzin".to_string());
        detail_capture.transmission = Some("Schaltgetriebe".to_string());
        detail_capture.price_eur = Some(20_500);
        detail_capture.captured_at = "2026-08-25T12:00:00+00:00".to_string();
        store.upsert(&[detail_capture]).await.unwrap();

        // a later search recapture with no attributes must not demote anything
        let mut recapture = Listing::new(id);
        recapture.price_eur = Some(20_500);
        recapture.captured_at = "2026-08-28T12:00:00+00:00".to_string();
        store.upsert(&[recapture]).await.unwrap();

        let stored = store.get(id).await.unwrap().unwrap();
        assert_eq!(stored.source, Source::Detail);
        assert_eq!(stored.fuel.as_deref(), Some("Benzin"));
        assert_eq!(stored.brand.as_deref(), Some("skoda"));
        assert_eq!(
            stored
                .price_history
                .iter()
                .map(|p| p.price_eur)
                .collect::<Vec<_>>(),
            vec![21_000, 20_500]
        );
        assert_eq!(stored.captured_at, "2026-08-28T12:00:00+00:00");
    }

    #[tokio::test]
    async fn url_variants_of_one_ad_never_compare_to_each_other() {
        let store = ListingStore::new(MemoryBackend::new());

        let target = captured("https://cars.example/s-anzeige/octavia/7200001-216", 20_000);
        let variant = captured("https://m.cars.example/anzeige/7200001", 15_000);
        let honest = captured("https://cars.example/s-anzeige/octavia/7200002", 19_800);
        store
            .upsert(&[target.clone(), variant, honest])
            .await
            .unwrap();

        let snapshot = store.load_all().await.unwrap();
        let comps = engine::find_comparables(&target, &snapshot, &AnalysisFilters::default());
        assert_eq!(comps.len(), 1);
        assert_eq!(comps[0].id, "https://cars.example/s-anzeige/octavia/7200002");
    }
}

// ============================================================================
// IMPORT / EXPORT SURFACE
// ============================================================================

mod transfer_flow {
    use super::*;

    #[tokio::test]
    async fn import_merge_then_export_json_round_trips() {
        let store = ListingStore::new(MemoryBackend::new());
        store
            .upsert(&[captured("https://cars.example/s-anzeige/octavia/7300001", 20_000)])
            .await
            .unwrap();

        let payload = r#"{"listings":[
            {"id":"https://cars.example/s-anzeige/octavia/7300001","price_eur":19500,
             "captured_at":"2026-08-29T08:00:00+00:00"},
            {"id":"https://cars.example/s-anzeige/octavia/7300002","price_eur":21000,
             "captured_at":"2026-08-29T08:00:00+00:00"}
        ]}"#;
        let count = transfer::import_listings(&store, payload, ImportMode::Merge)
            .await
            .unwrap();
        assert_eq!(count, 2);

        let map = store.load_all().await.unwrap();
        assert_eq!(map.len(), 2);
        let merged = &map["https://cars.example/s-anzeige/octavia/7300001"];
        assert_eq!(merged.price_eur, Some(19_500));
        assert_eq!(merged.brand.as_deref(), Some("skoda"));

        let exported = transfer::export_json(&map).unwrap();
        let reparsed = transfer::parse_import_payload(&exported).unwrap();
        assert_eq!(reparsed.len(), 2);
    }

    #[tokio::test]
    async fn import_replace_discards_everything_else() {
        let store = ListingStore::new(MemoryBackend::new());
        store
            .upsert(&[
                captured("https://cars.example/s-anzeige/octavia/7400001", 20_000),
                captured("https://cars.example/s-anzeige/octavia/7400002", 21_000),
            ])
            .await
            .unwrap();

        transfer::import_listings(
            &store,
            r#"{"data":[{"id":"https://x/a","price_eur":5000}]}"#,
            ImportMode::Replace,
        )
        .await
        .unwrap();

        let map = store.load_all().await.unwrap();
        assert_eq!(map.len(), 1);
        assert_eq!(map["https://x/a"].price_eur, Some(5000));
    }

    #[tokio::test]
    async fn malformed_import_leaves_store_untouched() {
        let store = ListingStore::new(MemoryBackend::new());
        store
            .upsert(&[captured("https://cars.example/s-anzeige/octavia/7500001", 20_000)])
            .await
            .unwrap();

        // second item has no id: the whole import is rejected
        let payload = r#"[{"id":"https://x/a"},{"price_eur":1}]"#;
        let result = transfer::import_listings(&store, payload, ImportMode::Replace).await;
        assert!(result.is_err());

        let map = store.load_all().await.unwrap();
        assert_eq!(map.len(), 1);
        assert!(map.contains_key("https://cars.example/s-anzeige/octavia/7500001"));
    }

    #[tokio::test]
    async fn csv_export_flattens_every_listing() {
        let store = ListingStore::new(MemoryBackend::new());
        store
            .upsert(&[
                captured("https://cars.example/s-anzeige/octavia/7600001", 20_000),
                captured("https://cars.example/s-anzeige/octavia/7600002", 21_000),
            ])
            .await
            .unwrap();

        let map = store.load_all().await.unwrap();
        let csv = transfer::export_csv(&map).unwrap();
        let lines: Vec<&str> = csv.lines().collect();
        assert_eq!(lines.len(), 3); // header + 2 rows
        assert!(lines[0].starts_with("id,url,title,price_eur,"));
    }
}

// ============================================================================
// PERSISTENCE FAILURE PROPAGATION
// ============================================================================

mod failure_propagation {
    use super::*;
    use anyhow::{anyhow, Result};
    use async_trait::async_trait;

    /// Backend whose writes always fail, reads succeed empty
    struct ReadOnlyBackend;

    #[async_trait]
    impl StoreBackend for ReadOnlyBackend {
        async fn load(&self) -> Result<Option<String>> {
            Ok(None)
        }

        async fn save(&self, _payload: &str) -> Result<()> {
            Err(anyhow!("disk full"))
        }
    }

    #[tokio::test]
    async fn save_failures_bubble_to_the_caller() {
        let store = ListingStore::new(ReadOnlyBackend);
        let err = store
            .upsert(&[captured("https://cars.example/s-anzeige/octavia/7700001", 20_000)])
            .await
            .unwrap_err();
        assert!(err.to_string().contains("disk full"));

        // reads still work and report the unchanged (empty) mapping
        assert_eq!(store.count().await.unwrap(), 0);
        assert!(store.get("anything").await.unwrap().is_none());
    }
}
