/// An empty message.
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct Empty {}
/// The metrics of a single component instance.
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct MetricsData {
    /// Total number of records received.
    #[prost(int64, tag = "2")]
    pub received_total: i64,
    /// Total number of records processed successfully.
    #[prost(int64, tag = "4")]
    pub processed_successfully_total: i64,
    /// Total number of system exceptions thrown.
    #[prost(int64, tag = "5")]
    pub system_exceptions_total: i64,
    /// Total number of user exceptions thrown.
    #[prost(int64, tag = "6")]
    pub user_exceptions_total: i64,
    /// Average process latency in milliseconds.
    #[prost(double, tag = "7")]
    pub avg_process_latency: f64,
    /// Timestamp of the last invocation, in epoch millis.
    #[prost(int64, tag = "8")]
    pub last_invocation: i64,
    /// User defined metrics.
    #[prost(map = "string, double", tag = "9")]
    pub user_metrics: ::std::collections::HashMap<::prost::alloc::string::String, f64>,
    /// One minute window of records received.
    #[prost(int64, tag = "10")]
    pub received_total_1min: i64,
    /// One minute window of records processed successfully.
    #[prost(int64, tag = "12")]
    pub processed_successfully_total_1min: i64,
    /// One minute window of system exceptions thrown.
    #[prost(int64, tag = "13")]
    pub system_exceptions_total_1min: i64,
    /// One minute window of user exceptions thrown.
    #[prost(int64, tag = "14")]
    pub user_exceptions_total_1min: i64,
    /// One minute window of average process latency in milliseconds.
    #[prost(double, tag = "15")]
    pub avg_process_latency_1min: f64,
}
#[doc = r" Generated client implementations."]
pub mod instance_control_client {
    #![allow(unused_variables, dead_code, missing_docs, clippy::let_unit_value)]
    use tonic::codegen::*;
    #[doc = " The control interface exposed by every component instance."]
    #[derive(Debug, Clone)]
    pub struct InstanceControlClient<T> {
        inner: tonic::client::Grpc<T>,
    }
    impl InstanceControlClient<tonic::transport::Channel> {
        #[doc = r" Attempt to create a new client by connecting to a given endpoint."]
        pub async fn connect<D>(dst: D) -> Result<Self, tonic::transport::Error>
        where
            D: std::convert::TryInto<tonic::transport::Endpoint>,
            D::Error: Into<StdError>,
        {
            let conn = tonic::transport::Endpoint::new(dst)?.connect().await?;
            Ok(Self::new(conn))
        }
    }
    impl<T> InstanceControlClient<T>
    where
        T: tonic::client::GrpcService<tonic::body::BoxBody>,
        T::ResponseBody: Body + Send + Sync + 'static,
        T::Error: Into<StdError>,
        <T::ResponseBody as Body>::Error: Into<StdError> + Send,
    {
        pub fn new(inner: T) -> Self {
            let inner = tonic::client::Grpc::new(inner);
            Self { inner }
        }
        pub fn with_interceptor<F>(inner: T, interceptor: F) -> InstanceControlClient<InterceptedService<T, F>>
        where
            F: tonic::service::Interceptor,
            T: tonic::codegen::Service<http::Request<tonic::body::BoxBody>, Response = http::Response<<T as tonic::client::GrpcService<tonic::body::BoxBody>>::ResponseBody>>,
            <T as tonic::codegen::Service<http::Request<tonic::body::BoxBody>>>::Error: Into<StdError> + Send + Sync,
        {
            InstanceControlClient::new(InterceptedService::new(inner, interceptor))
        }
        #[doc = " Get the current metrics of the instance."]
        pub async fn get_metrics(&mut self, request: impl tonic::IntoRequest<super::Empty>) -> Result<tonic::Response<super::MetricsData>, tonic::Status> {
            self.inner
                .ready()
                .await
                .map_err(|e| tonic::Status::new(tonic::Code::Unknown, format!("Service was not ready: {}", e.into())))?;
            let codec = tonic::codec::ProstCodec::default();
            let path = http::uri::PathAndQuery::from_static("/proto.InstanceControl/GetMetrics");
            self.inner.unary(request.into_request(), path, codec).await
        }
    }
}
