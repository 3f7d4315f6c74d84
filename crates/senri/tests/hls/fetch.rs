use senri::{HttpClient, HttpPlaylistFetcher, PlaylistFetcher, SenriError};
use url::Url;
use wiremock::{
    matchers::{method, path},
    Mock, MockServer, ResponseTemplate,
};

fn fetcher_with_retry(retry: u32) -> HttpPlaylistFetcher {
    HttpPlaylistFetcher::new(HttpClient::with_defaults().unwrap()).with_retry(retry)
}

#[tokio::test]
async fn zero_retry_still_fetches_once() -> anyhow::Result<()> {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/index.m3u8"))
        .respond_with(ResponseTemplate::new(200).set_body_string("#EXTM3U\n"))
        .expect(1)
        .mount(&server)
        .await;

    let url: Url = format!("{}/index.m3u8", server.uri()).parse()?;
    let data = fetcher_with_retry(0).fetch(&url).await?;
    assert_eq!(&data[..], b"#EXTM3U\n");
    Ok(())
}

#[tokio::test]
async fn failing_fetch_uses_every_attempt() -> anyhow::Result<()> {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/gone.m3u8"))
        .respond_with(ResponseTemplate::new(404))
        .expect(3)
        .mount(&server)
        .await;

    let url: Url = format!("{}/gone.m3u8", server.uri()).parse()?;
    assert!(matches!(
        fetcher_with_retry(3).fetch(&url).await,
        Err(SenriError::PlaylistFetchError)
    ));
    Ok(())
}
