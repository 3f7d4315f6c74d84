mod fetch;
mod parser;
mod tracker;

use senri::{HttpClient, HttpPlaylistFetcher};
use wiremock::{
    matchers::{method, path},
    Mock, MockServer, ResponseTemplate,
};

async fn setup_mock_server(body: &str) -> (String, MockServer) {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/playlist.m3u8"))
        .respond_with(ResponseTemplate::new(200).set_body_string(body))
        .mount(&mock_server)
        .await;

    (format!("{}/playlist.m3u8", mock_server.uri()), mock_server)
}

fn fetcher() -> HttpPlaylistFetcher {
    HttpPlaylistFetcher::new(HttpClient::with_defaults().unwrap()).with_retry(1)
}

trait HlsMock {
    async fn mock<S>(&self, mock_path: &str, body: S) -> &Self
    where
        S: AsRef<str>;

    async fn mock_media_playlist(&self, mock_path: &str, segments: &[&str]) -> &Self;
}

impl HlsMock for MockServer {
    async fn mock<S>(&self, mock_path: &str, body: S) -> &Self
    where
        S: AsRef<str>,
    {
        Mock::given(method("GET"))
            .and(path(mock_path))
            .respond_with(ResponseTemplate::new(200).set_body_string(body.as_ref()))
            .mount(self)
            .await;
        self
    }

    async fn mock_media_playlist(&self, mock_path: &str, segments: &[&str]) -> &Self {
        let mut body = String::from("#EXTM3U\n#EXT-X-TARGETDURATION:10\n#EXT-X-VERSION:3\n");
        for segment in segments {
            body.push_str(&format!("#EXTINF:9.009,\n{segment}\n"));
        }
        body.push_str("#EXT-X-ENDLIST\n");
        self.mock(mock_path, body).await
    }
}
