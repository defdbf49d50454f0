use super::support::{bearer, insert_catalog_service, insert_user, send_json, skip_notice, test_app};
use axum::http::StatusCode;
use regex::Regex;
use serde_json::{Value, json};
use serial_test::serial;
use sqlx::PgPool;
use uuid::Uuid;

fn submission_body(contact_email: &str, services: Vec<Value>) -> Value {
    json!({
        "company_name": "Acme Facilities",
        "contact_person": "Dana Lee",
        "contact_phone": "+14155552671",
        "contact_email": contact_email,
        "address": "1 Factory Road",
        "services": services,
    })
}

fn catalog_line(service_id: Uuid) -> Value {
    json!({ "kind": "catalog", "service_id": service_id })
}

async fn table_count(pool: &PgPool, table: &str) -> i64 {
    sqlx::query_scalar(&format!("SELECT COUNT(*) FROM {}", table))
        .fetch_one(pool)
        .await
        .unwrap()
}

#[tokio::test]
#[serial]
async fn submission_with_unknown_service_creates_nothing() {
    let Some((app, pool)) = test_app().await else {
        return skip_notice("submission_with_unknown_service_creates_nothing");
    };
    let known = insert_catalog_service(&pool, "HVAC Maintenance", true, json!([])).await;
    let unknown = Uuid::new_v4();

    let body = submission_body(
        "dana@acme.example",
        vec![catalog_line(known), catalog_line(unknown)],
    );
    let (status, response) = send_json(&app, "POST", "/api/amc-contracts", None, Some(body)).await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(response["code"], "INVALID_SERVICES");
    assert_eq!(
        response["content"]["invalid_service_ids"][0],
        json!(unknown.to_string())
    );

    // The rejection left no partial rows behind.
    assert_eq!(table_count(&pool, "amc_contracts").await, 0);
    assert_eq!(table_count(&pool, "service_requests").await, 0);
}

#[tokio::test]
#[serial]
async fn mid_transaction_failure_rolls_back_submission() {
    let Some((app, pool)) = test_app().await else {
        return skip_notice("mid_transaction_failure_rolls_back_submission");
    };
    let good = insert_catalog_service(&pool, "HVAC Maintenance", true, json!([])).await;
    let also_good = insert_catalog_service(&pool, "Pest Control", true, json!([])).await;

    // The first line inserts fine; the second fails its request-type check
    // inside the transaction, after the contract row is already written.
    let body = submission_body(
        "dana@acme.example",
        vec![
            catalog_line(good),
            json!({
                "kind": "catalog",
                "service_id": also_good,
                "request_type": "bogus",
            }),
        ],
    );
    let (status, response) = send_json(&app, "POST", "/api/amc-contracts", None, Some(body)).await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(response["code"], "VALIDATION_ERROR");

    // The partial contract and its first request were rolled back with it.
    assert_eq!(table_count(&pool, "amc_contracts").await, 0);
    assert_eq!(table_count(&pool, "service_requests").await, 0);
}

#[tokio::test]
#[serial]
async fn inactive_service_is_rejected_like_unknown() {
    let Some((app, pool)) = test_app().await else {
        return skip_notice("inactive_service_is_rejected_like_unknown");
    };
    let inactive = insert_catalog_service(&pool, "Retired Service", false, json!([])).await;

    let body = submission_body("dana@acme.example", vec![catalog_line(inactive)]);
    let (status, response) = send_json(&app, "POST", "/api/amc-contracts", None, Some(body)).await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(response["code"], "INVALID_SERVICES");
}

#[tokio::test]
#[serial]
async fn submission_fans_out_one_request_per_line() {
    let Some((app, pool)) = test_app().await else {
        return skip_notice("submission_fans_out_one_request_per_line");
    };
    let hvac = insert_catalog_service(
        &pool,
        "HVAC Maintenance",
        true,
        json!([{ "name": "Filter swap", "rate": "20.00" }]),
    )
    .await;
    let pest = insert_catalog_service(&pool, "Pest Control", true, json!([])).await;

    let body = submission_body(
        "dana@acme.example",
        vec![
            json!({
                "kind": "catalog",
                "service_id": hvac,
                "unit_price": "100.00",
                "quantity": 2,
                "sub_services": [{ "name": " filter SWAP ", "quantity": 3 }],
            }),
            catalog_line(pest),
            json!({ "kind": "custom", "service_name": "Generator overhaul" }),
        ],
    );
    let (status, response) = send_json(&app, "POST", "/api/amc-contracts", None, Some(body)).await;

    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(response["success"], json!(true));

    let content = &response["content"];
    let number_format = Regex::new(r"^AMC-\d{8}-\d{4}$").unwrap();
    assert!(number_format.is_match(content["contract_number"].as_str().unwrap()));
    assert_eq!(content["status"], "pending");

    let requests = content["service_requests"].as_array().unwrap();
    assert_eq!(requests.len(), 3);

    let custom = requests
        .iter()
        .find(|r| r["service_name"] == "Generator overhaul")
        .unwrap();
    assert_eq!(custom["category_name"], "Custom Service");
    assert_eq!(custom["request_type"], "quotation");

    let priced = requests
        .iter()
        .find(|r| r["total_price"].is_string() || r["total_price"].is_number())
        .unwrap();
    assert_eq!(priced["total_price"], json!("200.00"));

    // Backlink array mirrors the created children.
    let linked: Vec<Uuid> = sqlx::query_scalar(
        "SELECT unnest(service_request_ids) FROM amc_contracts LIMIT 3",
    )
    .fetch_all(&pool)
    .await
    .unwrap();
    assert_eq!(linked.len(), 3);

    // The catalog sub-service was reconciled with the catalog rate.
    let subs: Value = sqlx::query_scalar(
        "SELECT sub_services FROM service_requests WHERE service_id = $1",
    )
    .bind(hvac)
    .fetch_one(&pool)
    .await
    .unwrap();
    assert_eq!(subs[0]["name"], "Filter swap");
    assert_eq!(subs[0]["quantity"], 3);
}

#[tokio::test]
#[serial]
async fn contract_numbers_are_sequential_within_a_day() {
    let Some((app, pool)) = test_app().await else {
        return skip_notice("contract_numbers_are_sequential_within_a_day");
    };
    let service = insert_catalog_service(&pool, "HVAC Maintenance", true, json!([])).await;

    let mut numbers = Vec::new();
    for _ in 0..2 {
        let body = submission_body("dana@acme.example", vec![catalog_line(service)]);
        let (status, response) =
            send_json(&app, "POST", "/api/amc-contracts", None, Some(body)).await;
        assert_eq!(status, StatusCode::CREATED);
        numbers.push(
            response["content"]["contract_number"]
                .as_str()
                .unwrap()
                .to_string(),
        );
    }

    assert_ne!(numbers[0], numbers[1]);
    let seq = |n: &str| n.rsplit('-').next().unwrap().parse::<i64>().unwrap();
    assert_eq!(seq(&numbers[1]), seq(&numbers[0]) + 1);
}

#[tokio::test]
#[serial]
async fn cancelling_contract_spares_terminal_children() {
    let Some((app, pool)) = test_app().await else {
        return skip_notice("cancelling_contract_spares_terminal_children");
    };
    let admin = insert_user(&pool, "admin").await;
    let a = insert_catalog_service(&pool, "HVAC Maintenance", true, json!([])).await;
    let b = insert_catalog_service(&pool, "Pest Control", true, json!([])).await;

    let body = submission_body(
        "dana@acme.example",
        vec![catalog_line(a), catalog_line(b)],
    );
    let (_, response) = send_json(&app, "POST", "/api/amc-contracts", None, Some(body)).await;
    let contract_id = response["content"]["id"].as_str().unwrap().to_string();

    // One child already finished before the cancellation.
    sqlx::query("UPDATE service_requests SET status = 'completed' WHERE service_id = $1")
        .bind(a)
        .execute(&pool)
        .await
        .unwrap();

    let (status, response) = send_json(
        &app,
        "PUT",
        &format!("/api/amc-contracts/{}/status", contract_id),
        Some(&bearer(&admin)),
        Some(json!({ "status": "cancelled" })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(response["content"]["status"], "cancelled");

    let completed: String =
        sqlx::query_scalar("SELECT status FROM service_requests WHERE service_id = $1")
            .bind(a)
            .fetch_one(&pool)
            .await
            .unwrap();
    assert_eq!(completed, "completed");

    let cancelled: String =
        sqlx::query_scalar("SELECT status FROM service_requests WHERE service_id = $1")
            .bind(b)
            .fetch_one(&pool)
            .await
            .unwrap();
    assert_eq!(cancelled, "cancelled");
}

#[tokio::test]
#[serial]
async fn contract_read_is_stable_across_calls() {
    let Some((app, pool)) = test_app().await else {
        return skip_notice("contract_read_is_stable_across_calls");
    };
    let service = insert_catalog_service(&pool, "HVAC Maintenance", true, json!([])).await;
    let body = submission_body(
        "dana@acme.example",
        vec![
            catalog_line(service),
            json!({ "kind": "custom", "service_name": "Generator overhaul" }),
        ],
    );
    let (_, response) = send_json(&app, "POST", "/api/amc-contracts", None, Some(body)).await;
    let contract_id = response["content"]["id"].as_str().unwrap().to_string();
    let uri = format!("/api/amc-contracts/{}", contract_id);

    let (first_status, first) = send_json(&app, "GET", &uri, None, None).await;
    let (second_status, second) = send_json(&app, "GET", &uri, None, None).await;

    assert_eq!(first_status, StatusCode::OK);
    assert_eq!(second_status, StatusCode::OK);
    assert_eq!(first, second);
    assert_eq!(first["content"]["service_requests"].as_array().unwrap().len(), 2);
}

#[tokio::test]
#[serial]
async fn malformed_contract_id_is_a_bad_request() {
    let Some((app, _pool)) = test_app().await else {
        return skip_notice("malformed_contract_id_is_a_bad_request");
    };
    let (status, response) =
        send_json(&app, "GET", "/api/amc-contracts/not-a-uuid", None, None).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(response["code"], "INVALID_ID");
}

#[tokio::test]
#[serial]
async fn my_contracts_exact_page_has_no_next() {
    let Some((app, pool)) = test_app().await else {
        return skip_notice("my_contracts_exact_page_has_no_next");
    };
    let customer = insert_user(&pool, "customer").await;
    let service = insert_catalog_service(&pool, "HVAC Maintenance", true, json!([])).await;

    for _ in 0..10 {
        let body = submission_body(&customer.email, vec![catalog_line(service)]);
        let (status, _) = send_json(&app, "POST", "/api/amc-contracts", None, Some(body)).await;
        assert_eq!(status, StatusCode::CREATED);
    }

    let (status, response) = send_json(
        &app,
        "GET",
        "/api/amc-contracts/my?page=1&limit=10",
        Some(&bearer(&customer)),
        None,
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    let pagination = &response["content"]["pagination"];
    assert_eq!(pagination["total"], 10);
    assert_eq!(pagination["total_pages"], 1);
    assert_eq!(pagination["has_next_page"], json!(false));
    assert_eq!(pagination["has_prev_page"], json!(false));
    assert_eq!(response["content"]["items"].as_array().unwrap().len(), 10);
}

#[tokio::test]
#[serial]
async fn admin_listing_requires_admin_role() {
    let Some((app, pool)) = test_app().await else {
        return skip_notice("admin_listing_requires_admin_role");
    };
    let customer = insert_user(&pool, "customer").await;
    let admin = insert_user(&pool, "admin").await;

    let (status, _) = send_json(
        &app,
        "GET",
        "/api/amc-contracts",
        Some(&bearer(&customer)),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, response) = send_json(
        &app,
        "GET",
        "/api/amc-contracts?status=pending",
        Some(&bearer(&admin)),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert!(response["content"]["items"].is_array());
}
