//! Object indexes over datasets of a real working copy.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use quire_sdk::{
    Author, BufferChange, BufferChangeset, BufferPath, DatasetKey, JsonObjectSpec, ObjectChange, ObjectChangeset,
    ObjectSpec, Quire, QuireConfig, SdkError,
};
use quire_index::IndexError;
use serde_json::json;

fn path(s: &str) -> BufferPath {
    BufferPath::new(s).unwrap()
}

fn author() -> Author {
    Author::new("Ada", "ada@example.org")
}

fn specs() -> Vec<Arc<dyn ObjectSpec>> {
    vec![Arc::new(JsonObjectSpec::new())]
}

async fn seeded(quire: &Quire, root: &Path) -> (PathBuf, DatasetKey) {
    let workdir = root.join("copy");
    quire.git_init(&workdir, None).await.unwrap();
    let changes: BufferChangeset = [
        ("items/a.json", r#"{"t":1,"title":"Zebra"}"#),
        ("items/b.json", r#"{"t":2,"title":"Yak"}"#),
        ("items/c.json", r#"{"t":1,"title":"Aardvark"}"#),
        ("items/readme.md", "not an object"),
        ("other/d.json", r#"{"t":1}"#),
    ]
    .into_iter()
    .map(|(p, c)| (path(p), BufferChange::create(c)))
    .collect();
    quire.repo_update_buffers(&workdir, author(), "seed", changes, false).await.unwrap();

    let dataset = quire.ds_load(&workdir, path("items"), specs()).await.unwrap();
    let status = quire.ds_index_wait(&dataset, None).await.unwrap();
    assert!(status.complete);
    (workdir, dataset)
}

#[tokio::test]
async fn filtered_index_membership() {
    let dir = tempfile::tempdir().unwrap();
    let quire = Quire::default();
    let (_, dataset) = seeded(&quire, dir.path()).await;

    assert_eq!(quire.ds_index_count_objects(&dataset, None).unwrap(), 3);

    let id = quire.ds_index_get_or_create(&dataset, "obj.t == 1", None).unwrap();
    quire.ds_index_wait(&dataset, Some(&id)).await.unwrap();
    let members: Vec<_> = (0..quire.ds_index_count_objects(&dataset, Some(&id)).unwrap())
        .map(|i| quire.ds_index_get_object(&dataset, Some(&id), i).unwrap().unwrap())
        .collect();
    assert_eq!(members, vec![path("a.json"), path("c.json")]);

    for (position, member) in members.iter().enumerate() {
        assert_eq!(
            quire.ds_index_locate_position(&dataset, Some(&id), member).unwrap(),
            Some(position)
        );
    }
    assert_eq!(quire.ds_index_locate_position(&dataset, Some(&id), &path("b.json")).unwrap(), None);
}

#[tokio::test]
async fn sorted_index_and_object_path_queries() {
    let dir = tempfile::tempdir().unwrap();
    let quire = Quire::default();
    let (_, dataset) = seeded(&quire, dir.path()).await;

    let id = quire
        .ds_index_get_or_create(&dataset, "objPath.endsWith('.json')", Some("lower(title)"))
        .unwrap();
    quire.ds_index_wait(&dataset, Some(&id)).await.unwrap();

    let description = quire.ds_index_describe(&dataset, Some(&id)).unwrap();
    assert_eq!(description.sort_key.as_deref(), Some("lower(title)"));
    assert_eq!(description.status.object_count, 3);
    assert_eq!(quire.ds_index_get_object(&dataset, Some(&id), 0).unwrap(), Some(path("c.json")));
    assert_eq!(quire.ds_index_get_object(&dataset, Some(&id), 2).unwrap(), Some(path("a.json")));
}

#[tokio::test]
async fn commits_refresh_the_index() {
    let dir = tempfile::tempdir().unwrap();
    let quire = Quire::default();
    let (workdir, dataset) = seeded(&quire, dir.path()).await;
    let id = quire.ds_index_get_or_create(&dataset, "obj.t == 1", None).unwrap();
    quire.ds_index_wait(&dataset, Some(&id)).await.unwrap();

    let changes: BufferChangeset = [
        (path("items/b.json"), BufferChange::update(r#"{"t":2,"title":"Yak"}"#, r#"{"t":1}"#)),
        (path("items/a.json"), BufferChange::delete(r#"{"t":1,"title":"Zebra"}"#)),
    ]
    .into_iter()
    .collect();
    quire.repo_update_buffers(&workdir, author(), "edit", changes, false).await.unwrap();

    assert_eq!(quire.ds_index_count_objects(&dataset, None).unwrap(), 2);
    quire.ds_index_wait(&dataset, Some(&id)).await.unwrap();
    assert_eq!(quire.ds_index_get_object(&dataset, Some(&id), 0).unwrap(), Some(path("b.json")));
    assert_eq!(quire.ds_index_get_object(&dataset, Some(&id), 1).unwrap(), Some(path("c.json")));

    quire.repo_delete_tree(&workdir, author(), "clear", path("items")).await.unwrap();
    assert_eq!(quire.ds_index_count_objects(&dataset, None).unwrap(), 0);
}

#[tokio::test]
async fn read_objects_from_current_buffers() {
    let dir = tempfile::tempdir().unwrap();
    let quire = Quire::default();
    let (_, dataset) = seeded(&quire, dir.path()).await;

    let objects = quire
        .ds_read_objects(&dataset, &[path("a.json"), path("readme.md")])
        .await
        .unwrap();
    assert_eq!(objects[&path("a.json")], Some(json!({ "t": 1, "title": "Zebra" })));
    assert_eq!(objects[&path("readme.md")], None);
}

#[tokio::test]
async fn unloaded_dataset_rejects_queries() {
    let dir = tempfile::tempdir().unwrap();
    let quire = Quire::default();
    let (_, dataset) = seeded(&quire, dir.path()).await;

    assert!(quire.ds_unload(&dataset));
    assert!(matches!(
        quire.ds_index_count_objects(&dataset, None),
        Err(SdkError::Index(IndexError::NotRegistered(_)))
    ));
}

#[tokio::test]
async fn index_cache_survives_a_restart() {
    let dir = tempfile::tempdir().unwrap();
    let mut config = QuireConfig::default();
    config.index.cache_dir = Some(dir.path().join("cache"));

    let workdir = {
        let quire = Quire::new(config.clone());
        let (workdir, _) = seeded(&quire, dir.path()).await;
        quire.destroy();
        workdir
    };
    assert!(std::fs::read_dir(dir.path().join("cache")).unwrap().next().is_some());

    let quire = Quire::new(config);
    let dataset = quire.ds_load(&workdir, path("items"), specs()).await.unwrap();
    let status = quire.ds_index_wait(&dataset, None).await.unwrap();
    assert!(status.complete);
    assert_eq!(status.object_count, 3);
}

#[tokio::test]
async fn object_updates_commit_through_the_conflict_check() {
    let dir = tempfile::tempdir().unwrap();
    let quire = Quire::default();
    let (workdir, dataset) = seeded(&quire, dir.path()).await;

    let created = quire
        .ds_update_objects(
            &dataset,
            author(),
            "add d",
            ObjectChangeset::from([(path("d.json"), ObjectChange::create(json!({ "t": 1, "title": "Dodo" })))]),
            false,
        )
        .await
        .unwrap();
    assert!(created.is_committed());
    assert_eq!(quire.ds_index_count_objects(&dataset, None).unwrap(), 4);
    let objects = quire.ds_read_objects(&dataset, &[path("d.json")]).await.unwrap();
    assert_eq!(objects[&path("d.json")], Some(json!({ "t": 1, "title": "Dodo" })));

    let updated = quire
        .ds_update_objects(
            &dataset,
            author(),
            "rename d",
            ObjectChangeset::from([(
                path("d.json"),
                ObjectChange::update(json!({ "t": 1, "title": "Dodo" }), json!({ "t": 2, "title": "Dodo" })),
            )]),
            false,
        )
        .await
        .unwrap();
    assert!(updated.is_committed());

    // A stale old value conflicts on the object's buffer and changes nothing.
    let head = quire.repo_get_current_commit(&workdir).await.unwrap();
    let stale = quire
        .ds_update_objects(
            &dataset,
            author(),
            "stale",
            ObjectChangeset::from([(path("d.json"), ObjectChange::delete(json!({ "t": 1, "title": "Dodo" })))]),
            false,
        )
        .await
        .unwrap();
    assert_eq!(stale.conflicts.into_iter().collect::<Vec<_>>(), vec![path("items/d.json")]);
    assert_eq!(quire.repo_get_current_commit(&workdir).await.unwrap(), head);
    assert!(workdir.join("items/d.json").is_file());
}
