use std::net::SocketAddr;
use std::time::Duration;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::task::LocalSet;
use tokio::time::timeout;

use organicdump_server::protocol::messages::{
    Hello, IrrigationCommand, PeripheralMeta, RegisterIrrigationSystem, RegisterSoilMoistureSensor,
    SendSoilMoistureMeasurement, UnscheduledIrrigationRequest,
};
use organicdump_server::protocol::{ClientType, ErrorCode, FrameHeader, HEADER_LEN, Message, decode, encode};
use organicdump_server::{Server, ServerConfig};

const IO_TIMEOUT: Duration = Duration::from_secs(5);

struct Client {
    stream: TcpStream,
}

impl Client {
    async fn connect(addr: SocketAddr, client_type: ClientType, client_id: u64) -> Self {
        let stream = TcpStream::connect(addr).await.unwrap();
        let mut client = Self { stream };
        client
            .send(&Message::Hello(Hello {
                client_type,
                client_id,
            }))
            .await;
        client
    }

    async fn send(&mut self, message: &Message) {
        let frame = encode(message).unwrap();
        self.stream.write_all(&frame).await.unwrap();
    }

    async fn recv(&mut self) -> Message {
        let mut header = [0u8; HEADER_LEN];
        timeout(IO_TIMEOUT, self.stream.read_exact(&mut header))
            .await
            .expect("timed out waiting for a frame")
            .unwrap();
        let header = FrameHeader::peek(&header).unwrap();
        let mut payload = vec![0u8; header.len];
        timeout(IO_TIMEOUT, self.stream.read_exact(&mut payload))
            .await
            .expect("timed out waiting for a payload")
            .unwrap();
        decode(header.kind, &payload).unwrap()
    }

    async fn request(&mut self, message: &Message) -> (ErrorCode, Option<u64>) {
        self.send(message).await;
        match self.recv().await {
            Message::BasicResponse(response) => (response.code, response.id),
            other => panic!("expected a BasicResponse, got {other:?}"),
        }
    }

    /// Reads the handshake acknowledgement and returns the echoed id.
    async fn request_ack(&mut self) -> Option<u64> {
        match self.recv().await {
            Message::BasicResponse(response) if response.code == ErrorCode::Ok => response.id,
            other => panic!("expected a handshake acknowledgement, got {other:?}"),
        }
    }

    /// True once the server has closed its end.
    async fn is_closed_by_server(&mut self) -> bool {
        let mut byte = [0u8; 1];
        matches!(timeout(IO_TIMEOUT, self.stream.read(&mut byte)).await, Ok(Ok(0)) | Ok(Err(_)))
    }
}

fn test_config() -> ServerConfig {
    ServerConfig {
        bind_address: "127.0.0.1".into(),
        port: 0,
        database_path: ":memory:".into(),
        acknowledge_handshake: true,
        ..ServerConfig::default()
    }
}

#[tokio::test]
async fn clients_round_trip_over_tcp() {
    let local = LocalSet::new();
    local
        .run_until(async {
            let mut server = Server::bind(&test_config()).await.unwrap();
            let addr = server.local_addr();
            tokio::task::spawn_local(async move { server.run().await });

            let mut control = Client::connect(addr, ClientType::Control, 1).await;
            assert_eq!(control.request_ack().await, Some(1));

            let (code, sensor_id) = control
                .request(&Message::RegisterSoilMoistureSensor(RegisterSoilMoistureSensor {
                    meta: PeripheralMeta {
                        name: "bed-3".into(),
                        rpi_id: None,
                    },
                    floor: 0.2,
                    ceil: 0.8,
                }))
                .await;
            assert_eq!(code, ErrorCode::Ok);
            let sensor_id = sensor_id.unwrap();

            // The RPi handler shares the control handler's store.
            let mut rpi = Client::connect(addr, ClientType::Rpi, 10).await;
            assert_eq!(rpi.request_ack().await, Some(10));
            let (code, _) = rpi
                .request(&Message::SendSoilMoistureMeasurement(SendSoilMoistureMeasurement {
                    sensor_id,
                    value: 0.55,
                }))
                .await;
            assert_eq!(code, ErrorCode::Ok);

            let (code, valve_id) = control
                .request(&Message::RegisterIrrigationSystem(RegisterIrrigationSystem {
                    meta: PeripheralMeta {
                        name: "valve-1".into(),
                        rpi_id: None,
                    },
                }))
                .await;
            assert_eq!(code, ErrorCode::Ok);
            let valve_id = valve_id.unwrap();

            let mut valve = Client::connect(addr, ClientType::IrrigationSystem, valve_id).await;
            assert_eq!(valve.request_ack().await, Some(valve_id));

            let (code, _) = control
                .request(&Message::UnscheduledIrrigationRequest(UnscheduledIrrigationRequest {
                    irrigation_system_id: valve_id,
                    duration_ms: 1_500,
                }))
                .await;
            assert_eq!(code, ErrorCode::Ok);
            assert_eq!(
                valve.recv().await,
                Message::IrrigationCommand(IrrigationCommand { duration_ms: 1_500 })
            );
        })
        .await;
}

#[tokio::test]
async fn misbehaving_client_is_disconnected_without_affecting_others() {
    let local = LocalSet::new();
    local
        .run_until(async {
            let mut server = Server::bind(&test_config()).await.unwrap();
            let addr = server.local_addr();
            tokio::task::spawn_local(async move { server.run().await });

            let mut control = Client::connect(addr, ClientType::Control, 1).await;
            assert_eq!(control.request_ack().await, Some(1));

            // Garbage header: unknown message kind.
            let mut rogue = TcpStream::connect(addr).await.unwrap();
            rogue.write_all(&[0, 0, 0, 99, 0, 0, 0, 0]).await.unwrap();
            let mut rogue = Client { stream: rogue };
            assert!(rogue.is_closed_by_server().await);

            // A peer that hangs up mid-frame is dropped too.
            let mut partial = TcpStream::connect(addr).await.unwrap();
            partial.write_all(&[0, 0, 0, 1]).await.unwrap();
            drop(partial);

            let (code, _) = control
                .request(&Message::SendSoilMoistureMeasurement(SendSoilMoistureMeasurement {
                    sensor_id: 404,
                    value: 0.1,
                }))
                .await;
            assert_eq!(code, ErrorCode::NotFound);
        })
        .await;
}
