pub mod builders;
pub mod dns_server_mock;
pub mod tls_fixture;

pub use builders::{ConfigBuilder, QueryBuilder};
pub use dns_server_mock::{DohReply, MockDohServer, MockStreamServer, MockUdpServer, Reply};
pub use tls_fixture::TlsFixture;
