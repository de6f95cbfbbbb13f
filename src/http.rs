pub use chatcore::net::{HttpClient, HttpRequest, HttpResponse};
pub use chatsync_ureq_http_client::UreqHttpClient;
