// Copyright © 2025 rustmailer.com
// Licensed under RustMailer License Agreement v1.0
// Unauthorized copying, modification, or distribution is prohibited.

use crate::modules::database::{
    filter_by_secondary_key_impl, insert_impl, paginate_query_primary_scan_all_impl, update_impl,
};
use native_db::*;
use native_model::{native_model, Model};
use native_db::Builder;
use serde::{Deserialize, Serialize};
use std::sync::{Arc, LazyLock};

#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
#[native_model(id = 9001, version = 1)]
#[native_db(primary_key(pk -> u64), secondary_key(name_key -> String))]
struct Widget {
    #[primary_key]
    id: u64,
    #[secondary_key]
    name: String,
    count: u64,
}

impl Widget {
    fn pk(&self) -> u64 {
        self.id
    }
    fn name_key(&self) -> String {
        self.name.clone()
    }
}

static WIDGET_MODELS: LazyLock<Models> = LazyLock::new(|| {
    let mut models = Models::new();
    models.define::<Widget>().unwrap();
    models
});

#[tokio::test]
async fn insert_then_find_by_secondary_key() {
    let db = Arc::new(Builder::new().create_in_memory(&WIDGET_MODELS).unwrap());
    insert_impl(
        &db,
        Widget {
            id: 1,
            name: "alpha".into(),
            count: 0,
        },
    )
    .await
    .unwrap();

    let found: Vec<Widget> =
        filter_by_secondary_key_impl(&db, WidgetKey::name_key, "alpha".to_string())
            .await
            .unwrap();
    assert_eq!(found.len(), 1);
    assert_eq!(found[0].id, 1);
}

#[tokio::test]
async fn update_impl_commits_read_modify_write_in_one_transaction() {
    let db = Arc::new(Builder::new().create_in_memory(&WIDGET_MODELS).unwrap());
    insert_impl(
        &db,
        Widget {
            id: 2,
            name: "beta".into(),
            count: 0,
        },
    )
    .await
    .unwrap();

    update_impl::<Widget>(
        &db,
        |rw| {
            Ok(rw
                .get()
                .primary::<Widget>(2u64)
                .unwrap()
                .expect("widget exists"))
        },
        |current| {
            let mut updated = current.clone();
            updated.count += 1;
            Ok(updated)
        },
    )
    .await
    .unwrap();

    let found: Vec<Widget> =
        filter_by_secondary_key_impl(&db, WidgetKey::name_key, "beta".to_string())
            .await
            .unwrap();
    assert_eq!(found[0].count, 1);
}

#[tokio::test]
async fn paginate_respects_page_size() {
    let db = Arc::new(Builder::new().create_in_memory(&WIDGET_MODELS).unwrap());
    for i in 0..5u64 {
        insert_impl(
            &db,
            Widget {
                id: i,
                name: format!("w{i}"),
                count: 0,
            },
        )
        .await
        .unwrap();
    }

    let page = paginate_query_primary_scan_all_impl::<Widget>(&db, Some(1), Some(2), None)
        .await
        .unwrap();
    assert_eq!(page.total_items, 5);
    assert_eq!(page.items.len(), 2);
    assert_eq!(page.total_pages, Some(3));
}
