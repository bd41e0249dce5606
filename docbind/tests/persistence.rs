use docbind::{
    bson::{DateTime, doc, oid::ObjectId},
    prelude::*,
};
use futures::TryStreamExt;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, Model)]
#[serde(default)]
struct Profile {
    #[serde(rename = "_id", skip_serializing_if = "Option::is_none")]
    id: Option<ObjectId>,
    #[serde(rename = "_updated", skip_serializing_if = "Option::is_none")]
    updated: Option<DateTime>,
    title: String,
    email: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, Model)]
#[serde(default)]
struct Post {
    #[serde(rename = "_id", skip_serializing_if = "Option::is_none")]
    id: Option<ObjectId>,
    author: Option<ObjectId>,
    body: String,
}

#[tokio::test]
async fn data_survives_reopening_the_directory() {
    let dir = tempfile::tempdir().unwrap();
    let settings = FileStoreSettings::new(dir.path()).with_database_name("blog");

    let (alex_id, post_count) = {
        let session = docbind::init::<(Profile, Post)>(settings.clone()).await.unwrap();
        let profiles = session.bind::<Profile>().unwrap();
        let posts = session.bind::<Post>().unwrap();

        let mut alex = Profile { title: "Alex".into(), email: "test@test.ru".into(), ..Default::default() };
        profiles.save(&mut alex).await.unwrap();
        alex.title = "Alexis".into();
        profiles.save(&mut alex).await.unwrap();

        for n in 0..12 {
            let mut post = Post { author: alex.id, body: format!("post {n}"), ..Default::default() };
            posts.save(&mut post).await.unwrap();
        }
        posts.clear(doc! { "body": "post 0" }).await.unwrap();

        session.shutdown().await.unwrap();
        (alex.id.unwrap(), 11)
    };

    let session = docbind::init::<(Profile, Post)>(settings).await.unwrap();
    let profiles = session.bind::<Profile>().unwrap();
    let posts = session.bind::<Post>().unwrap();

    let alex = profiles.get(alex_id).await.unwrap().unwrap();
    assert_eq!(alex.title, "Alexis");
    assert!(alex.updated.is_some());

    let by_author = posts.find(doc! { "author": alex_id }).await.unwrap();
    assert_eq!(by_author.count(), post_count);

    let bodies = by_author
        .stream_all(4)
        .map_ok(|post| post.body)
        .try_collect::<Vec<_>>()
        .await
        .unwrap();
    assert_eq!(bodies.first().map(String::as_str), Some("post 1"));
    assert_eq!(bodies.len(), 11);

    assert_eq!(session.list_collections().await.unwrap(), vec!["post", "profile"]);
}

#[tokio::test]
async fn unflushed_session_is_replayed_from_journals() {
    let dir = tempfile::tempdir().unwrap();
    let settings = FileStoreSettings::new(dir.path());

    let id = {
        let session = docbind::init::<(Profile,)>(settings.clone()).await.unwrap();
        let profiles = session.bind::<Profile>().unwrap();

        let mut sam = Profile { title: "Sam".into(), ..Default::default() };
        let id = profiles.save(&mut sam).await.unwrap().id();
        profiles.remove(&sam).await.unwrap();

        let mut kim = Profile { title: "Kim".into(), ..Default::default() };
        profiles.save(&mut kim).await.unwrap();
        id
    };

    let session = docbind::init::<(Profile,)>(settings).await.unwrap();
    let profiles = session.bind::<Profile>().unwrap();

    assert_eq!(profiles.get(id).await.unwrap(), None);
    let remaining = profiles.find(()).await.unwrap().all().await.unwrap();
    assert_eq!(remaining.len(), 1);
    assert_eq!(remaining[0].title, "Kim");
}

#[tokio::test]
async fn init_fails_when_directory_cannot_be_opened() {
    let dir = tempfile::tempdir().unwrap();
    let occupied = dir.path().join("not-a-directory");
    std::fs::write(&occupied, b"data").unwrap();

    let result = docbind::init::<(Profile,)>(FileStoreSettings::new(&occupied)).await;

    assert!(matches!(result, Err(DocumentStoreError::ConnectionFailed(_))));
}

#[tokio::test]
async fn settings_deserialize_with_defaults() {
    let settings: FileStoreSettings = serde_json::from_value(serde_json::json!({
        "directory_path": "/srv/app",
    }))
    .unwrap();

    assert_eq!(settings, FileStoreSettings::new("/srv/app"));
    assert_eq!(settings.database_name, "test");
}
