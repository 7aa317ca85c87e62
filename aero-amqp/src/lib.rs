pub mod client;
pub mod decode;
pub mod encode;
pub mod error;
pub mod transport;
/// Just enough of AMQP 0-9-1 to publish messages
///
/// ## Trace
///
/// ```text
/// C: AMQP 0 0 9 1
/// S: connection.start        version=0-9 mechanisms="AMQPLAIN PLAIN"
/// C: connection.start-ok     mechanism=PLAIN response="\0guest\0guest"
/// S: connection.tune         channel-max=2047 frame-max=131072 heartbeat=60
/// C: connection.tune-ok      channel-max=2047 frame-max=131072 heartbeat=0
/// C: connection.open         virtual-host="/"
/// S: connection.open-ok
/// C: channel.open            (channel 1)
/// S: channel.open-ok         (channel 1)
/// C: basic.publish           exchange="mail" routing-key="events"
/// C: content header          class=60 body-size=42
/// C: content body            {"user":"alice","folder":"INBOX","uid":42}
/// C: channel.close           200 "Goodbye"
/// S: channel.close-ok
/// C: connection.close        200 "Goodbye"
/// S: connection.close-ok
/// ```
///
/// ## References
///
/// AMQP 0-9-1 - https://www.rabbitmq.com/resources/specs/amqp0-9-1.pdf
///
/// PLAIN SASL - https://datatracker.ietf.org/doc/html/rfc4616
///
/// RabbitMQ errata - https://www.rabbitmq.com/amqp-0-9-1-errata.html
pub mod types;

pub use client::{ConnectOptions, Connection};
pub use error::{Error, Result};
