//! Integration tests for on-demand hydration of references and collections

mod common;

use assert_matches::assert_matches;
use pretty_assertions::assert_eq;
use serde_json::json;
use turborally::{Error, Fetch};
use wiremock::matchers::{method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

use common::{PagedDataset, WSAPI, defect, rally_for, wsapi_root};

async fn mount_single_defect(server: &MockServer) {
    let root = wsapi_root(server);
    Mock::given(method("GET"))
        .and(path(format!("{}/defect", WSAPI)))
        .respond_with(PagedDataset::new(vec![defect(&root, 1, "Open")]))
        .mount(server)
        .await;
}

#[tokio::test]
async fn test_revision_history_hydrates_on_access() {
    let mock_server = MockServer::start().await;
    mount_single_defect(&mock_server).await;

    Mock::given(method("GET"))
        .and(path(format!("{}/revisionhistory/9001", WSAPI)))
        .and(query_param("fetch", "true"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_string(common::load_response_fixture("revision_history", &mock_server)),
        )
        .expect(1)
        .mount(&mock_server)
        .await;
    Mock::given(method("GET"))
        .and(path(format!("{}/RevisionHistory/9001/Revisions", WSAPI)))
        .and(query_param("fetch", "true"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_string(common::load_response_fixture("revisions", &mock_server)),
        )
        .expect(1)
        .mount(&mock_server)
        .await;

    let rally = rally_for(&mock_server);
    let request = rally.query("Defect").fetch(Fetch::True).limit(1usize).build().unwrap();
    let mut result = rally.get(request).await.unwrap();
    let defect = result.next().await.unwrap().expect("one defect");
    assert!(defect.is_hydrated());

    let history_ref = defect.reference("RevisionHistory").expect("history ref");
    assert!(!history_ref.is_resolved());
    assert!(history_ref.get().is_none());

    let history = history_ref.resolve(&rally).await.unwrap();
    assert!(history.is_hydrated());
    assert_eq!(history.oid(), 9001);
    assert_eq!(history.type_name(), "RevisionHistory");
    assert!(history_ref.is_resolved());

    let revisions_ref = history.collection("Revisions").expect("revisions collection");
    assert_eq!(revisions_ref.count(), 3);
    assert!(!revisions_ref.is_resolved());

    let revisions = history.members(&rally, "Revisions").await.unwrap();
    assert_eq!(revisions.len(), 3);
    for (revision, number) in revisions.iter().zip(0i64..) {
        assert!(revision.is_hydrated());
        assert_eq!(revision.i64("RevisionNumber"), Some(number));
        assert!(revision.str("Description").is_some());
    }
    assert_eq!(
        revisions[2].reference("User").unwrap().ref_object_name(),
        Some("Grace Hopper")
    );

    // cached: neither endpoint is hit again
    let again = history_ref.resolve(&rally).await.unwrap();
    assert_eq!(again.oid(), 9001);
    assert_eq!(history.members(&rally, "Revisions").await.unwrap().len(), 3);
    assert!(revisions_ref.is_resolved());

    mock_server.verify().await;
}

#[tokio::test]
async fn test_reference_clones_share_resolution() {
    let mock_server = MockServer::start().await;
    mount_single_defect(&mock_server).await;
    let root = wsapi_root(&mock_server);

    Mock::given(method("GET"))
        .and(path(format!("{}/user/77", WSAPI)))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "User": {
                "_ref": format!("{}/user/77", root),
                "_refObjectName": "Ada Lovelace",
                "_type": "User",
                "ObjectID": 77,
                "UserName": "ada@acme.com",
                "EmailAddress": "ada@acme.com"
            }
        })))
        .expect(1)
        .mount(&mock_server)
        .await;

    let rally = rally_for(&mock_server);
    let request = rally.query("Defect").fetch("Owner").build().unwrap();
    let defects = rally.get(request).await.unwrap().collect_all().await.unwrap();

    let owner = defects[0].reference("Owner").unwrap();
    let alias = owner.clone();
    let user = owner.resolve(&rally).await.unwrap();
    assert!(user.is_hydrated());
    assert_eq!(user.str("UserName"), Some("ada@acme.com"));

    assert!(alias.is_resolved());
    assert_eq!(alias.resolve(&rally).await.unwrap().oid(), 77);

    mock_server.verify().await;
}

#[tokio::test]
async fn test_shell_record_hydrates_in_place() {
    let mock_server = MockServer::start().await;
    mount_single_defect(&mock_server).await;
    let root = wsapi_root(&mock_server);

    Mock::given(method("GET"))
        .and(path(format!("{}/defect/1", WSAPI)))
        .and(query_param("fetch", "true"))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(json!({ "Defect": defect(&root, 1, "Open") })),
        )
        .expect(1)
        .mount(&mock_server)
        .await;

    let rally = rally_for(&mock_server);
    let request = rally.query("Defect").build().unwrap();
    let mut shell = rally.get(request).await.unwrap().next().await.unwrap().unwrap();
    assert!(!shell.is_hydrated());
    assert!(shell.str("State").is_none());

    shell.hydrate(&rally).await.unwrap();
    assert!(shell.is_hydrated());
    assert_eq!(shell.str("State"), Some("Open"));

    // already hydrated: no further request
    shell.hydrate(&rally).await.unwrap();
    mock_server.verify().await;
}

#[tokio::test]
async fn test_get_by_oid() {
    let mock_server = MockServer::start().await;
    let root = wsapi_root(&mock_server);

    Mock::given(method("GET"))
        .and(path(format!("{}/defect/5", WSAPI)))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(json!({ "Defect": defect(&root, 5, "Closed") })),
        )
        .mount(&mock_server)
        .await;

    let rally = rally_for(&mock_server);
    let defect = rally.get_by_oid("defect", 5).await.unwrap();
    assert_eq!(defect.oid(), 5);
    assert_eq!(defect.str("State"), Some("Closed"));
    assert!(defect.is_hydrated());

    assert_matches!(
        rally.get_by_oid("Payjammas", 5).await,
        Err(Error::InvalidTypeName(name)) if name == "Payjammas"
    );
}

#[tokio::test]
async fn test_missing_reference_is_not_found() {
    let mock_server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path(format!("{}/defect/404", WSAPI)))
        .respond_with(ResponseTemplate::new(404).set_body_json(json!({
            "OperationResult": {"Errors": ["Cannot find object to read"], "Warnings": []}
        })))
        .mount(&mock_server)
        .await;

    let rally = rally_for(&mock_server);
    let err = rally.get_by_oid("Defect", 404).await.unwrap_err();
    assert_matches!(err, Error::NotFound(msg) if msg == "Cannot find object to read");
}

#[tokio::test]
async fn test_operation_errors_on_reference_fetch() {
    let mock_server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path(format!("{}/defect/13", WSAPI)))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "OperationResult": {"Errors": ["Not authorized to view object"], "Warnings": []}
        })))
        .mount(&mock_server)
        .await;

    let rally = rally_for(&mock_server);
    assert_matches!(
        rally.get_by_oid("Defect", 13).await,
        Err(Error::Service { errors }) if errors == vec!["Not authorized to view object"]
    );
}

#[tokio::test]
async fn test_members_of_non_collection_attribute() {
    let mock_server = MockServer::start().await;
    mount_single_defect(&mock_server).await;

    let rally = rally_for(&mock_server);
    let request = rally.query("Defect").fetch(true).build().unwrap();
    let defect = rally.get(request).await.unwrap().next().await.unwrap().unwrap();

    assert_matches!(
        defect.members(&rally, "State").await,
        Err(Error::ResponseValidation(_))
    );
    assert_matches!(
        defect.members(&rally, "Fabulote").await,
        Err(Error::NotFound(_))
    );
}

#[tokio::test]
async fn test_inline_reference_list_members_hydrate_once() {
    let mock_server = MockServer::start().await;
    let root = wsapi_root(&mock_server);

    let mut record = defect(&root, 1, "Open");
    record["Tags"] = json!([
        {"_ref": format!("{}/tag/31", root), "_refObjectName": "urgent", "_type": "Tag"},
        {"_ref": format!("{}/tag/32", root), "_refObjectName": "customer", "_type": "Tag"}
    ]);
    Mock::given(method("GET"))
        .and(path(format!("{}/defect", WSAPI)))
        .respond_with(PagedDataset::new(vec![record]))
        .mount(&mock_server)
        .await;

    for (oid, name) in [(31u64, "urgent"), (32, "customer")] {
        Mock::given(method("GET"))
            .and(path(format!("{}/tag/{}", WSAPI, oid)))
            .and(query_param("fetch", "true"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "Tag": {
                    "_ref": format!("{}/tag/{}", root, oid),
                    "_refObjectName": name,
                    "_type": "Tag",
                    "ObjectID": oid,
                    "Name": name,
                    "Archived": false
                }
            })))
            .expect(1)
            .mount(&mock_server)
            .await;
    }

    let rally = rally_for(&mock_server);
    let request = rally.query("Defect").fetch(Fetch::True).build().unwrap();
    let defect = rally.get(request).await.unwrap().next().await.unwrap().unwrap();

    let tags = defect.get("Tags").and_then(|a| a.as_list()).expect("inline tag list");
    assert_eq!(tags.len(), 2);
    assert!(tags.iter().all(|t| t.as_entity_ref().is_some_and(|r| !r.is_resolved())));

    let members = defect.members(&rally, "Tags").await.unwrap();
    assert_eq!(members.len(), 2);
    assert!(members.iter().all(|m| m.is_hydrated()));
    assert_eq!(members[0].oid(), 31);
    assert_eq!(members[1].str("Name"), Some("customer"));

    // cached on the inline references
    let again = defect.members(&rally, "Tags").await.unwrap();
    assert_eq!(again.len(), 2);
    assert!(tags.iter().all(|t| t.as_entity_ref().is_some_and(|r| r.is_resolved())));

    mock_server.verify().await;
}
