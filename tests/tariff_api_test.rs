// ==========================================
// 归类/税率 API 集成测试
// ==========================================
// 测试目标: 校验 → 层级 → 第二版查询 → 批量查询 → 缓存/回落
// 上游与翻译使用 helpers/fake_services.rs 中的替身
// ==========================================

mod test_helpers;

#[path = "helpers/fake_services.rs"]
mod fake_services;

use fake_services::{FakeTariffApiClient, FakeTranslator};
use std::sync::Arc;
use tariff_engine::api::ApiError;
use tariff_engine::app::AppState;
use tariff_engine::domain::tariff::{AntiDumpingOverride, TariffRateQuery};
use tariff_engine::domain::types::{ClassificationLevel, DataSource, MatchStatus};
use tariff_engine::logging;
use tempfile::NamedTempFile;

struct Fixture {
    _db: NamedTempFile,
    client: Arc<FakeTariffApiClient>,
    state: AppState,
}

fn setup() -> Fixture {
    logging::init_test();
    let (db, db_path) = test_helpers::create_test_db().expect("创建测试数据库失败");
    let client = Arc::new(FakeTariffApiClient::new());
    let translator = Arc::new(FakeTranslator::new());
    let state = test_helpers::build_state(&db_path, client.clone(), Some(translator))
        .expect("装配应用状态失败");
    Fixture {
        _db: db,
        client,
        state,
    }
}

// ==========================================
// 校验
// ==========================================

#[tokio::test]
async fn test_chapter_is_valid_with_children() {
    let f = setup();
    let result = f.state.tariff_api.validate_code("84").await.unwrap();

    assert!(result.is_valid);
    assert_eq!(result.level, Some(ClassificationLevel::Chapter));
    assert!(result.has_children);
    assert_eq!(result.child_count, 2);
    assert_eq!(result.breadcrumb.len(), 1);
}

#[tokio::test]
async fn test_unknown_chapter_is_not_found() {
    let f = setup();
    let validation = f.state.tariff_api.validate_code("99").await.unwrap();
    assert!(!validation.is_valid);
    assert_eq!(validation.level, Some(ClassificationLevel::Chapter));
    assert!(validation.error.is_some());

    let result = f.state.tariff_api.lookup_v2("99", None, false).await.unwrap();
    assert_eq!(result.match_status, MatchStatus::NotFound);
    assert!(result.rate.is_none());
    assert!(result.candidates.is_empty());
}

#[tokio::test]
async fn test_unknown_heading_is_not_found() {
    let f = setup();
    let validation = f.state.tariff_api.validate_code("9999").await.unwrap();
    assert!(!validation.is_valid);
    assert_eq!(validation.level, Some(ClassificationLevel::Heading));
    assert_eq!(validation.parent_code.as_deref(), Some("99"));

    let result = f.state.tariff_api.lookup_v2("9999", None, false).await.unwrap();
    assert_eq!(result.match_status, MatchStatus::NotFound);
    assert!(result.candidates.is_empty());
}

#[tokio::test]
async fn test_code_shorter_than_two_digits_is_invalid() {
    let f = setup();
    let result = f.state.tariff_api.validate_code("8").await.unwrap();
    assert!(!result.is_valid);
    assert!(result.error.is_some());
    assert_eq!(result.match_status(), MatchStatus::NotFound);

    let err = f.state.tariff_api.lookup_rate("8", None).await.unwrap_err();
    assert!(matches!(err, ApiError::InvalidInput(_)));
}

#[tokio::test]
async fn test_breadcrumb_is_monotonic_for_commodity() {
    let f = setup();
    let result = f.state.tariff_api.validate_code("8471 30 10 00").await.unwrap();

    assert!(result.is_valid);
    assert!(result.is_declarable);
    assert_eq!(result.parent_code.as_deref(), Some("8471300000"));
    assert_eq!(result.description_cn.as_deref(), Some("译:Laptops"));

    let codes: Vec<&str> = result.breadcrumb.iter().map(|b| b.code.as_str()).collect();
    assert_eq!(codes, vec!["84", "8471", "847130", "84713010", "8471301000"]);
    for pair in result.breadcrumb.windows(2) {
        assert!(pair[1].code.starts_with(&pair[0].code));
    }
}

// ==========================================
// 第二版查询
// ==========================================

#[tokio::test]
async fn test_subheading_is_parent_node_with_three_descendants() {
    let f = setup();
    let result = f.state.tariff_api.lookup_v2("847130", None, false).await.unwrap();

    assert_eq!(result.match_status, MatchStatus::ParentNode);
    assert_eq!(result.validation.child_count, 3);
    assert_eq!(result.validation.declarable_count, 3);
    assert_eq!(result.children.len(), 3);
    assert!(result.children.iter().all(|c| c.code.starts_with("847130")));
    assert!(result.rate.is_none());
    assert!(result.candidates.is_empty());
}

#[tokio::test]
async fn test_unknown_code_is_not_found_with_bounded_candidates() {
    let f = setup();
    let result = f.state.tariff_api.lookup_v2("9999999999", None, false).await.unwrap();
    assert_eq!(result.match_status, MatchStatus::NotFound);
    assert!(result.candidates.len() <= 10);
    assert!(result.rate.is_none());
}

#[tokio::test]
async fn test_not_found_candidates_prefer_same_subheading() {
    let f = setup();
    let result = f.state.tariff_api.lookup_v2("8471305000", None, false).await.unwrap();

    assert_eq!(result.match_status, MatchStatus::NotFound);
    assert_eq!(result.validation.parent_code.as_deref(), Some("8471"));
    assert!(result.validation.similar_codes.len() <= 5);

    let codes: Vec<&str> = result.candidates.iter().map(|c| c.code.as_str()).collect();
    assert_eq!(codes, vec!["8471301000", "8471302000", "8471309000"]);
    for pair in result.candidates.windows(2) {
        assert!(pair[0].score >= pair[1].score);
    }
}

#[tokio::test]
async fn test_exact_match_returns_rate_for_origin() {
    let f = setup();
    let result = f
        .state
        .tariff_api
        .lookup_v2("8471.30.10", Some("cn"), false)
        .await
        .unwrap();

    assert_eq!(result.match_status, MatchStatus::Exact);
    assert!(!result.persisted);
    let rate = result.rate.expect("可申报编码应返回税率");
    assert_eq!(rate.hs_code10, "8471301000");
    assert_eq!(rate.hs_code, "84713010");
    assert_eq!(rate.origin_country_code.as_deref(), Some("CN"));
    assert_eq!(rate.third_country_duty, Some(2.0));
    assert_eq!(rate.duty_rate, Some(2.0));
    assert_eq!(rate.anti_dumping_rate, Some(35.0));
    assert_eq!(rate.vat_rate, Some(20.0));
    assert_eq!(rate.data_source, DataSource::TradeTariffApi);
    assert_eq!(rate.goods_description_cn.as_deref(), Some("译:Laptops"));
}

#[tokio::test]
async fn test_persist_writes_exact_match_to_mirror() {
    let f = setup();
    let result = f
        .state
        .tariff_api
        .lookup_v2("8471301000", None, true)
        .await
        .unwrap();
    assert!(result.persisted);

    let page = f
        .state
        .tariff_api
        .query_local_rates(TariffRateQuery {
            code_prefix: Some("8471".to_string()),
            ..Default::default()
        })
        .unwrap();
    assert_eq!(page.total, 1);
    assert_eq!(page.items[0].hs_code10, "8471301000");
    assert_eq!(page.items[0].origin_country_code, "");
    assert_eq!(page.items[0].goods_description.as_deref(), Some("Laptops"));
    assert_eq!(page.items[0].duty_rate, Some(2.0));
    assert_eq!(page.items[0].data_source, DataSource::TradeTariffApi);
}

#[tokio::test]
async fn test_persist_keeps_override_values_out_of_mirror() {
    let f = setup();
    f.state
        .tariff_api
        .upsert_anti_dumping_override(AntiDumpingOverride {
            id: None,
            hs_code: "847130".to_string(),
            origin_country_code: "JP".to_string(),
            duty_rate: None,
            anti_dumping_rate: Some(12.5),
            countervailing_rate: None,
            goods_description: None,
            goods_description_cn: Some("覆盖表描述".to_string()),
            is_active: true,
        })
        .unwrap();

    let result = f
        .state
        .tariff_api
        .lookup_v2("8471301000", Some("jp"), true)
        .await
        .unwrap();
    assert!(result.persisted);
    let rate = result.rate.unwrap();
    assert_eq!(rate.anti_dumping_rate, Some(12.5));

    let page = f
        .state
        .tariff_api
        .query_local_rates(TariffRateQuery {
            code_prefix: Some("8471301000".to_string()),
            origin_country_code: Some("JP".to_string()),
            ..Default::default()
        })
        .unwrap();
    assert_eq!(page.total, 1);
    let row = &page.items[0];
    assert_eq!(row.anti_dumping_rate, None);
    assert_eq!(row.goods_description_cn, None);
    assert_eq!(row.duty_rate, Some(2.0));
    assert_eq!(row.measures.len(), 3);
}

// ==========================================
// 税率查询 / 批量
// ==========================================

#[tokio::test]
async fn test_lookup_rate_is_idempotent_and_cached() {
    let f = setup();
    let first = f.state.tariff_api.lookup_rate("8471301000", None).await.unwrap();
    let calls = f.client.commodity_calls();
    let second = f.state.tariff_api.lookup_rate("8471301000", None).await.unwrap();

    assert!(!first.from_cache);
    assert!(second.from_cache);
    assert_eq!(first.duty_rate, second.duty_rate);
    assert_eq!(first.vat_rate, second.vat_rate);
    assert_eq!(first.total_measures, second.total_measures);
    assert_eq!(f.client.commodity_calls(), calls);
}

#[tokio::test]
async fn test_batch_lookup_collects_per_item_errors() {
    let f = setup();
    let codes = vec!["847130".to_string(), "999999".to_string()];
    let result = f.state.tariff_api.batch_lookup(&codes, None, Some(1)).await.unwrap();

    assert_eq!(result.total_count, 2);
    assert_eq!(result.success_count, 1);
    assert_eq!(result.failed_count, 1);
    assert_eq!(result.results[0].hs_code10, "8471300000");
    assert_eq!(result.errors[0].code, "999999");
}

#[tokio::test]
async fn test_override_applies_and_invalidates_rate_cache() {
    let f = setup();
    let before = f
        .state
        .tariff_api
        .lookup_rate("8471301000", Some("JP"))
        .await
        .unwrap();
    assert_eq!(before.anti_dumping_rate, None);

    f.state
        .tariff_api
        .upsert_anti_dumping_override(AntiDumpingOverride {
            id: None,
            hs_code: "847130".to_string(),
            origin_country_code: "jp".to_string(),
            duty_rate: None,
            anti_dumping_rate: Some(12.5),
            countervailing_rate: None,
            goods_description: None,
            goods_description_cn: None,
            is_active: true,
        })
        .unwrap();

    let after = f
        .state
        .tariff_api
        .lookup_rate("8471301000", Some("JP"))
        .await
        .unwrap();
    assert!(!after.from_cache);
    assert_eq!(after.anti_dumping_rate, Some(12.5));
    assert!(after.sources.contains(&DataSource::ChinaAntiDumpingDatabase));
}

#[tokio::test]
async fn test_negative_override_rate_is_rejected() {
    let f = setup();
    let err = f
        .state
        .tariff_api
        .upsert_anti_dumping_override(AntiDumpingOverride {
            id: None,
            hs_code: "7318".to_string(),
            origin_country_code: "CN".to_string(),
            duty_rate: None,
            anti_dumping_rate: Some(-1.0),
            countervailing_rate: None,
            goods_description: None,
            goods_description_cn: None,
            is_active: true,
        })
        .unwrap_err();
    assert!(matches!(err, ApiError::InvalidInput(_)));
}

// ==========================================
// 上游不可用
// ==========================================

#[tokio::test]
async fn test_upstream_down_falls_back_to_mirror() {
    let f = setup();
    f.state
        .tariff_api
        .lookup_v2("8471301000", None, true)
        .await
        .unwrap();
    f.state.cache.clear();
    f.client.set_offline(true);

    let validation = f.state.tariff_api.validate_code("8471301000").await.unwrap();
    assert!(validation.is_valid);
    assert!(validation.is_declarable);
    assert!(validation.warning.is_some());

    let rate = f
        .state
        .tariff_api
        .lookup_rate("8471301000", Some("US"))
        .await
        .unwrap();
    assert_eq!(rate.data_source, DataSource::LocalDatabase);
    assert!(rate.note.is_some());

    // 降级结果不缓存
    let again = f
        .state
        .tariff_api
        .lookup_rate("8471301000", Some("US"))
        .await
        .unwrap();
    assert!(!again.from_cache);
}

#[tokio::test]
async fn test_upstream_down_without_mirror_data_escalates() {
    let f = setup();
    f.client.set_offline(true);

    let err = f.state.tariff_api.validate_code("8473").await.unwrap_err();
    assert!(matches!(err, ApiError::UpstreamUnavailable(_)));

    let err = f.state.tariff_api.lookup_rate("8473300000", None).await.unwrap_err();
    assert!(matches!(err, ApiError::UpstreamUnavailable(_)));
}

// ==========================================
// 层级 / 元数据
// ==========================================

#[tokio::test]
async fn test_heading_hierarchy_groups_declarables() {
    let f = setup();
    let tree = f.state.tariff_api.get_hierarchy("8471", None).await.unwrap();

    assert_eq!(tree.level, ClassificationLevel::Heading);
    assert_eq!(tree.groups.len(), 2);
    assert_eq!(tree.total_declarable, 5);
    assert_eq!(tree.section.as_ref().map(|s| s.id.as_str()), Some("16"));
    assert_eq!(tree.groups[0].parent_code, "8471300000");
    assert_eq!(
        tree.groups[0].children[0].description_cn.as_deref(),
        Some("译:Laptops")
    );

    let cached = f.state.tariff_api.get_hierarchy("8471", None).await.unwrap();
    assert!(cached.from_cache);
}

#[tokio::test]
async fn test_chapter_hierarchy_lists_headings() {
    let f = setup();
    let tree = f.state.tariff_api.get_hierarchy("84", None).await.unwrap();
    assert_eq!(tree.level, ClassificationLevel::Chapter);
    assert_eq!(tree.headings.len(), 2);
    assert_eq!(tree.headings[0].code, "8471");
    assert!(tree.groups.is_empty());
}

#[tokio::test]
async fn test_origin_countries_are_cached() {
    let f = setup();
    let countries = f.state.tariff_api.list_origin_countries().await.unwrap();
    assert_eq!(countries.len(), 3);

    f.client.set_offline(true);
    let cached = f.state.tariff_api.list_origin_countries().await.unwrap();
    assert_eq!(cached, countries);
}

#[tokio::test]
async fn test_search_requires_query_and_caches_pages() {
    let f = setup();
    for code in ["8471301000", "8471302000"] {
        f.state.tariff_api.lookup_v2(code, None, true).await.unwrap();
    }

    let err = f
        .state
        .tariff_api
        .search_by_description("  ", None, None, None, None)
        .await
        .unwrap_err();
    assert!(matches!(err, ApiError::InvalidInput(_)));

    let result = f
        .state
        .tariff_api
        .search_by_description("Laptop", Some("84"), None, None, None)
        .await
        .unwrap();
    assert_eq!(result.total, 1);
    assert_eq!(result.items[0].hs_code10, "8471301000");
    assert!(!result.from_cache);

    let again = f
        .state
        .tariff_api
        .search_by_description("Laptop", Some("84"), None, None, None)
        .await
        .unwrap();
    assert!(again.from_cache);
}
