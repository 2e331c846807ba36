//! Request dispatcher.

use crate::interfaces::InterfaceProvider;
use crate::metrics::Metrics;
use bytes::{Bytes, BytesMut};
use slpd_protocol::reply::{error_reply, service_reply, service_type_reply};
use slpd_protocol::{
    ErrorCode, FunctionId, Header, ProtocolError, RequestBody, ServiceTable, SLP_VERSION,
};
use std::sync::Arc;

/// Turns request datagrams into reply datagrams.
///
/// Holds no per-request state; one handler is shared by every in-flight
/// request and each call allocates its own reply buffer.
pub struct RequestHandler {
    services: Arc<ServiceTable>,
    interfaces: Arc<dyn InterfaceProvider>,
    /// Metrics for request tracking.
    metrics: Option<Arc<Metrics>>,
}

impl RequestHandler {
    /// Creates a new request handler.
    pub fn new(services: Arc<ServiceTable>, interfaces: Arc<dyn InterfaceProvider>) -> Self {
        Self {
            services,
            interfaces,
            metrics: None,
        }
    }

    /// Sets the metrics instance.
    pub fn with_metrics(mut self, metrics: Arc<Metrics>) -> Self {
        metrics.services_registered.set(self.services.len() as f64);
        self.metrics = Some(metrics);
        self
    }

    /// Returns the service table.
    pub fn services(&self) -> &ServiceTable {
        &self.services
    }

    /// Returns a reference to the metrics, if set.
    pub fn metrics(&self) -> Option<&Arc<Metrics>> {
        self.metrics.as_ref()
    }

    /// Handles a request datagram and returns the reply to send back.
    ///
    /// Never fails: anything that cannot be answered normally is answered
    /// with an error reply built from whatever header fields could be read.
    pub fn handle(&self, request: &[u8]) -> Bytes {
        let function_name = request
            .get(1)
            .and_then(|b| FunctionId::try_from(*b).ok())
            .map(FunctionId::name)
            .unwrap_or("UNKNOWN");

        let timer = self.metrics.as_ref().map(|m| {
            m.request_duration
                .with_label_values(&[function_name])
                .start_timer()
        });

        let reply = match self.dispatch(request) {
            Ok(reply) => reply,
            Err((header, e)) => {
                let code = e.error_code();
                if code == ErrorCode::InternalError {
                    tracing::warn!(function = function_name, xid = header.xid, code = %code, "{}", e);
                } else {
                    tracing::debug!(function = function_name, xid = header.xid, code = %code, "{}", e);
                }
                if let Some(ref metrics) = self.metrics {
                    metrics
                        .errors_total
                        .with_label_values(&[code.to_string().as_str()])
                        .inc();
                }
                error_reply(&header, code)
            }
        };

        if let Some(ref metrics) = self.metrics {
            metrics.requests_total.with_label_values(&[function_name]).inc();
        }
        drop(timer); // Observation happens on drop

        reply.freeze()
    }

    fn dispatch(&self, request: &[u8]) -> Result<BytesMut, (Header, ProtocolError)> {
        // Version is checked before anything else so a future version with a
        // different header layout is still answered with VER_NOT_SUPPORTED.
        if let Some(&version) = request.first() {
            if version != SLP_VERSION {
                return Err((
                    Header::salvage(request),
                    ProtocolError::UnsupportedVersion(version),
                ));
            }
        }

        let header = Header::decode(request).map_err(|e| (Header::salvage(request), e))?;
        tracing::debug!(
            function = %header.function_id,
            xid = header.xid,
            lang = %header.language_tag_str(),
            "Handling request"
        );

        let result = RequestBody::decode(request, &header).and_then(|body| match body {
            RequestBody::ServiceType(_) => service_type_reply(&header, &self.services),
            RequestBody::Service(req) => {
                let addresses = self.interfaces.ipv4_addresses();
                service_reply(&header, &req.service_type, &self.services, &addresses)
            }
        });
        result.map_err(|e| (header, e))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::interfaces::StaticInterfaces;
    use proptest::prelude::*;
    use slpd_protocol::message::{ServiceRequest, ServiceTypeRequest};
    use slpd_protocol::reply::decode_error_code;
    use slpd_protocol::{ServiceEntry, ServiceReply, ServiceTypeReply};
    use std::net::Ipv4Addr;

    const SRVTYPE_RQST: [u8; 29] = [
        0x02, 0x09, 0x00, 0x00, 0x1d, 0x00, 0x00, 0x00, 0x00, 0x00, 0x74, 0xe2, 0x00, 0x02, b'e',
        b'n', 0x00, 0x00, 0xff, 0xff, 0x00, 0x07, b'D', b'E', b'F', b'A', b'U', b'L', b'T',
    ];

    fn services() -> Arc<ServiceTable> {
        Arc::new(
            vec![
                ServiceEntry::new("obmc_console", "tcp", 80),
                ServiceEntry::new("ssh", "tcp", 22),
            ]
            .into_iter()
            .collect(),
        )
    }

    fn test_handler() -> RequestHandler {
        RequestHandler::new(
            services(),
            Arc::new(StaticInterfaces::new(vec![Ipv4Addr::new(10, 0, 0, 5)])),
        )
    }

    fn service_request(service_type: &str) -> Vec<u8> {
        let header = Header::new(FunctionId::SrvRqst, 0x0101, "en");
        ServiceRequest::new(service_type.to_string(), "DEFAULT")
            .encode(&header)
        .unwrap()
        .to_vec()
    }

    #[test]
    fn test_service_type_request() {
        let handler = test_handler();
        let reply = handler.handle(&SRVTYPE_RQST);

        let decoded = ServiceTypeReply::decode(&reply).unwrap();
        assert_eq!(decoded.header.xid, 0x74e2);
        assert_eq!(decoded.header.language_tag.as_ref(), b"en");
        assert_eq!(
            decoded.service_types,
            vec!["service:obmc_console", "service:ssh"]
        );
    }

    #[test]
    fn test_service_request() {
        let handler = test_handler();
        let reply = handler.handle(&service_request("service:obmc_console"));

        let decoded = ServiceReply::decode(&reply).unwrap();
        assert_eq!(decoded.header.xid, 0x0101);
        assert_eq!(decoded.urls.len(), 1);
        assert_eq!(decoded.urls[0].url, "service:obmc_console:tcp//10.0.0.5,80");
    }

    #[test]
    fn test_service_request_unknown_type() {
        let handler = test_handler();
        let reply = handler.handle(&service_request("service:printer"));
        assert_eq!(reply[1], FunctionId::SrvRply.as_u8());
        assert_eq!(
            decode_error_code(&reply).unwrap(),
            Some(ErrorCode::InternalError)
        );
    }

    #[test]
    fn test_service_request_with_latin1_predicate() {
        let handler = test_handler();
        let header = Header::new(FunctionId::SrvRqst, 0x0202, "en");
        let request = ServiceRequest {
            predicate: Bytes::from_static(b"(x=\xe9)"),
            pr_list: Bytes::from_static(b"\xff"),
            spi: Bytes::from_static(b"\xc0"),
            ..ServiceRequest::new("service:obmc_console", "DEFAULT")
        }
        .encode(&header)
        .unwrap();

        let reply = handler.handle(&request);
        assert_eq!(decode_error_code(&reply).unwrap(), None);
        let decoded = ServiceReply::decode(&reply).unwrap();
        assert_eq!(decoded.urls.len(), 1);
        assert_eq!(decoded.urls[0].url, "service:obmc_console:tcp//10.0.0.5,80");
    }

    #[test]
    fn test_non_utf8_service_type_is_unknown() {
        let handler = test_handler();
        let header = Header::new(FunctionId::SrvRqst, 0x0203, "en");
        let request = ServiceRequest::new(&b"service:obmc_\xe9onsole"[..], "DEFAULT")
            .encode(&header)
            .unwrap();

        let reply = handler.handle(&request);
        assert_eq!(reply[1], FunctionId::SrvRply.as_u8());
        assert_eq!(
            decode_error_code(&reply).unwrap(),
            Some(ErrorCode::InternalError)
        );
    }

    #[test]
    fn test_service_request_without_addresses() {
        let handler = RequestHandler::new(services(), Arc::new(StaticInterfaces::default()));
        let reply = handler.handle(&service_request("service:ssh"));
        assert_eq!(
            decode_error_code(&reply).unwrap(),
            Some(ErrorCode::InternalError)
        );
    }

    #[test]
    fn test_empty_service_table() {
        let handler = RequestHandler::new(
            Arc::new(ServiceTable::new()),
            Arc::new(StaticInterfaces::new(vec![Ipv4Addr::new(10, 0, 0, 5)])),
        );
        let reply = handler.handle(&SRVTYPE_RQST);
        assert_eq!(reply.len(), 14 + 2 + 2);
        assert_eq!(
            decode_error_code(&reply).unwrap(),
            Some(ErrorCode::InternalError)
        );
    }

    #[test]
    fn test_unsupported_version() {
        let handler = test_handler();
        let mut request = SRVTYPE_RQST;
        request[0] = 1;
        let reply = handler.handle(&request);

        assert_eq!(reply.len(), 14 + 2 + 2);
        assert_eq!(reply[0], 1);
        assert_eq!(&reply[10..12], &[0x74, 0xe2]);
        assert_eq!(&reply[16..18], &[0x00, 0x09]);
    }

    #[test]
    fn test_invalid_function() {
        let handler = test_handler();
        let mut request = SRVTYPE_RQST;
        request[1] = 0x99;
        let reply = handler.handle(&request);

        assert_eq!(reply.len(), 14 + 2 + 2);
        assert_eq!(reply[0], 0x02);
        assert_eq!(reply[1], 0x99);
        assert_eq!(&reply[16..18], &[0x00, 0x02]);
    }

    #[test]
    fn test_unhandled_function() {
        let handler = test_handler();
        let mut request = SRVTYPE_RQST;
        request[1] = FunctionId::AttrRqst.as_u8();
        let reply = handler.handle(&request);

        assert_eq!(reply[1], FunctionId::AttrRply.as_u8());
        assert_eq!(
            decode_error_code(&reply).unwrap(),
            Some(ErrorCode::MsgNotSupported)
        );
    }

    #[test]
    fn test_truncated_body() {
        let handler = test_handler();
        let reply = handler.handle(&SRVTYPE_RQST[..25]);
        assert_eq!(reply[1], FunctionId::SrvTypeRply.as_u8());
        assert_eq!(
            decode_error_code(&reply).unwrap(),
            Some(ErrorCode::ParseError)
        );
    }

    #[test]
    fn test_short_header() {
        let handler = test_handler();
        let reply = handler.handle(&[0x02, 0x09, 0x00]);
        assert_eq!(reply.len(), 14 + 2);
        assert_eq!(reply[0], 0x02);
        assert_eq!(reply[1], 0x0A);
        assert_eq!(&reply[14..16], &[0x00, 0x02]);
    }

    #[test]
    fn test_encoded_service_type_request_matches_sample() {
        let header = Header::new(FunctionId::SrvTypeRqst, 0x74e2, "en");
        let encoded = ServiceTypeRequest::new("DEFAULT").encode(&header).unwrap();
        assert_eq!(encoded.as_ref(), &SRVTYPE_RQST[..]);
    }

    #[test]
    fn test_metrics_recorded() {
        let metrics = Arc::new(Metrics::new().unwrap());
        let handler = test_handler().with_metrics(metrics.clone());

        handler.handle(&SRVTYPE_RQST);
        handler.handle(&service_request("service:printer"));
        let mut bad = SRVTYPE_RQST;
        bad[1] = 0x99;
        handler.handle(&bad);

        let encoded = String::from_utf8(metrics.encode()).unwrap();
        assert!(encoded.contains("slpd_requests_total{function=\"SRVTYPERQST\"} 1"));
        assert!(encoded.contains("slpd_requests_total{function=\"SRVRQST\"} 1"));
        assert!(encoded.contains("slpd_requests_total{function=\"UNKNOWN\"} 1"));
        assert!(encoded.contains("slpd_errors_total{code=\"INTERNAL_ERROR\"} 1"));
        assert!(encoded.contains("slpd_errors_total{code=\"PARSE_ERROR\"} 1"));
        assert!(encoded.contains("slpd_services_registered 2"));
    }

    proptest! {
        #[test]
        fn prop_handle_is_total(data in proptest::collection::vec(any::<u8>(), 0..128)) {
            let handler = test_handler();
            let reply = handler.handle(&data);
            let salvaged = Header::salvage(&data);

            prop_assert!(reply.len() >= 14 + 2);
            let len = u32::from_be_bytes([0, reply[2], reply[3], reply[4]]) as usize;
            prop_assert_eq!(len, reply.len());
            prop_assert_eq!(reply[0], salvaged.version);
            prop_assert_eq!(&reply[10..12], &salvaged.xid.to_be_bytes()[..]);
        }

        #[test]
        fn prop_handle_valid_prefix_with_garbage_body(
            function in prop::sample::select(vec![0x01u8, 0x09]),
            body in proptest::collection::vec(any::<u8>(), 0..64),
        ) {
            let handler = test_handler();
            let mut request = SRVTYPE_RQST[..16].to_vec();
            request[1] = function;
            request.extend_from_slice(&body);

            let reply = handler.handle(&request);
            prop_assert_eq!(reply[1], function + 1);
            prop_assert_eq!(&reply[14..16], b"en");
        }
    }
}
