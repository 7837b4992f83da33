use shared::domain::ConsentRecord;
use storage::{ConsentStore, CookieConsentStore, CookieJar, SqliteCookieJar, CONSENT_COOKIE_NAME};

#[tokio::test]
async fn record_survives_reopening_the_jar() {
    let temp = tempfile::tempdir().expect("tempdir");
    let db_path = temp.path().join("nested").join("cookies.db");
    let database_url = format!("sqlite://{}", db_path.to_string_lossy().replace('\\', "/"));

    {
        let jar = SqliteCookieJar::new(&database_url).await.expect("jar");
        let store = CookieConsentStore::new(jar);
        store
            .write(&ConsentRecord::new(true, false, true))
            .await
            .expect("write");
    }

    assert!(db_path.exists(), "jar file should exist: {}", db_path.display());

    let jar = SqliteCookieJar::new(&database_url).await.expect("reopen");
    let raw = jar.get(CONSENT_COOKIE_NAME).await.expect("get");
    assert!(raw.is_some_and(|value| value.starts_with("%7B")));

    let store = CookieConsentStore::new(jar);
    assert_eq!(store.read().await, Some(ConsentRecord::new(true, false, true)));
}
