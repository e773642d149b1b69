//! 消息管道与已读状态测试（集成测试）
//!
//! 覆盖落库-确认-扇出的顺序、成员校验、历史分页的时间顺序与
//! 已读副作用、mark-read 的幂等性。

mod common;

use std::sync::Arc;

use domain::{ConnectionId, ContentType, DomainError, Principal, Room, RoomId};
use infrastructure::{MemoryMessageRepository, MemoryRoomRepository, MemoryUserDirectory};
use uuid::Uuid;

use application::error::ApplicationError;
use application::events::ServerEvent;
use application::repository::{MessageRepository, RoomRepository};
use application::sequencer::RoomSequencer;
use application::services::{MessageService, MessageServiceDependencies, SendMessageRequest};

use common::{host, traveler, CaptureBroadcaster, Delivery, SteppingClock};

struct Fixture {
    rooms: Arc<MemoryRoomRepository>,
    messages: Arc<MemoryMessageRepository>,
    directory: Arc<MemoryUserDirectory>,
    broadcaster: Arc<CaptureBroadcaster>,
    service: MessageService,
}

fn fixture() -> Fixture {
    let rooms = Arc::new(MemoryRoomRepository::new());
    let messages = Arc::new(MemoryMessageRepository::new());
    let directory = Arc::new(MemoryUserDirectory::new());
    let broadcaster = Arc::new(CaptureBroadcaster::new());
    let service = MessageService::new(MessageServiceDependencies {
        room_repository: rooms.clone(),
        message_repository: messages.clone(),
        directory: directory.clone(),
        broadcaster: broadcaster.clone(),
        sequencer: Arc::new(RoomSequencer::new()),
        clock: Arc::new(SteppingClock::new()),
    });
    Fixture {
        rooms,
        messages,
        directory,
        broadcaster,
        service,
    }
}

async fn seed_room(fixture: &Fixture, a: &Principal, b: &Principal) -> Room {
    fixture.directory.upsert(a.clone()).await;
    fixture.directory.upsert(b.clone()).await;
    let room = Room::direct(
        RoomId::new(Uuid::new_v4()),
        a.id,
        b.id,
        chrono::Utc::now(),
    )
    .unwrap();
    fixture.rooms.insert(room.clone()).await.unwrap()
}

fn send_request(room: &Room, sender: &Principal, content: &str) -> SendMessageRequest {
    SendMessageRequest {
        room_id: room.id,
        sender: sender.clone(),
        connection_id: ConnectionId::generate(),
        content: content.to_string(),
        content_type: ContentType::Text,
        media_ref: None,
    }
}

#[tokio::test]
async fn send_persists_acks_then_fans_out() {
    let fixture = fixture();
    let alice = traveler("Alice");
    let bob = host("Bob");
    let room = seed_room(&fixture, &alice, &bob).await;

    let request = send_request(&room, &alice, "hi");
    let connection_id = request.connection_id;
    let dto = fixture.service.send(request).await.unwrap();

    assert_eq!(dto.content, "hi");
    assert_eq!(dto.sender.id, alice.id);
    assert_eq!(dto.sender.name, "Alice");

    // 房间摘要已经指向新消息
    let stored_room = fixture.rooms.find_by_id(room.id).await.unwrap().unwrap();
    assert_eq!(
        stored_room.last_message_id.map(Uuid::from),
        Some(dto.id)
    );

    // 顺序：确认 -> 房间/私有频道扇出 -> 会话列表摘要
    let deliveries = fixture.broadcaster.deliveries();
    assert_eq!(deliveries.len(), 3);
    match &deliveries[0] {
        Delivery::Connection(target, ServerEvent::MessageSent { message }) => {
            assert_eq!(*target, connection_id);
            assert_eq!(message.id, dto.id);
        }
        other => panic!("expected sender ack first, got {other:?}"),
    }
    match &deliveries[1] {
        Delivery::FanOut(room_id, principals, except, ServerEvent::ReceiveMessage { message }) => {
            assert_eq!(*room_id, room.id);
            assert_eq!(principals.as_slice(), &[bob.id]);
            assert_eq!(*except, Some(connection_id));
            assert_eq!(message.id, dto.id);
        }
        other => panic!("expected message fan-out second, got {other:?}"),
    }
    match &deliveries[2] {
        Delivery::Principal(target, ServerEvent::RoomUpdated { room: summary }) => {
            assert_eq!(*target, bob.id);
            assert_eq!(summary.id, room.id);
            assert_eq!(summary.last_message.id, dto.id);
        }
        other => panic!("expected room summary last, got {other:?}"),
    }
}

#[tokio::test]
async fn send_from_non_participant_changes_nothing() {
    let fixture = fixture();
    let alice = traveler("Alice");
    let bob = host("Bob");
    let carol = traveler("Carol");
    let room = seed_room(&fixture, &alice, &bob).await;
    fixture.directory.upsert(carol.clone()).await;

    let result = fixture.service.send(send_request(&room, &carol, "x")).await;

    assert!(matches!(
        result,
        Err(ApplicationError::Domain(DomainError::NotAParticipant))
    ));
    let stored_room = fixture.rooms.find_by_id(room.id).await.unwrap().unwrap();
    assert!(stored_room.last_message_id.is_none());
    assert!(fixture.broadcaster.deliveries().is_empty());
}

#[tokio::test]
async fn blank_text_is_rejected_before_persistence() {
    let fixture = fixture();
    let alice = traveler("Alice");
    let bob = host("Bob");
    let room = seed_room(&fixture, &alice, &bob).await;

    let result = fixture.service.send(send_request(&room, &alice, "   ")).await;

    assert!(matches!(
        result,
        Err(ApplicationError::Domain(DomainError::InvalidArgument { .. }))
    ));
    assert!(fixture
        .messages
        .page_desc(room.id, 1, 10)
        .await
        .unwrap()
        .is_empty());
    assert!(fixture.broadcaster.deliveries().is_empty());
}

#[tokio::test]
async fn unknown_room_is_reported_as_not_found() {
    let fixture = fixture();
    let alice = traveler("Alice");
    fixture.directory.upsert(alice.clone()).await;
    let phantom = Room::direct(
        RoomId::new(Uuid::new_v4()),
        alice.id,
        host("Bob").id,
        chrono::Utc::now(),
    )
    .unwrap();

    let result = fixture.service.send(send_request(&phantom, &alice, "hi")).await;

    assert!(matches!(
        result,
        Err(ApplicationError::Domain(DomainError::RoomNotFound))
    ));
}

#[tokio::test]
async fn same_room_messages_fan_out_in_send_order() {
    let fixture = fixture();
    let alice = traveler("Alice");
    let bob = host("Bob");
    let room = seed_room(&fixture, &alice, &bob).await;

    fixture
        .service
        .send(send_request(&room, &alice, "first"))
        .await
        .unwrap();
    fixture
        .service
        .send(send_request(&room, &bob, "second"))
        .await
        .unwrap();

    let fanned: Vec<String> = fixture
        .broadcaster
        .deliveries()
        .into_iter()
        .filter_map(|delivery| match delivery {
            Delivery::FanOut(_, _, _, ServerEvent::ReceiveMessage { message }) => {
                Some(message.content)
            }
            _ => None,
        })
        .collect();

    assert_eq!(fanned, vec!["first".to_string(), "second".to_string()]);
}

#[tokio::test]
async fn history_is_chronological_and_marks_read_one_way() {
    let fixture = fixture();
    let alice = traveler("Alice");
    let bob = host("Bob");
    let room = seed_room(&fixture, &alice, &bob).await;

    for content in ["one", "two", "three"] {
        fixture
            .service
            .send(send_request(&room, &alice, content))
            .await
            .unwrap();
    }

    // B 离线期间的三条消息在重连拉取时按时间顺序返回
    let page = fixture.service.history(room.id, bob.id, 1, 50).await.unwrap();
    let contents: Vec<&str> = page.iter().map(|m| m.content.as_str()).collect();
    assert_eq!(contents, vec!["one", "two", "three"]);

    // 副作用：Alice 的消息对 Bob 已读，反向不成立
    assert_eq!(
        fixture.messages.unread_count(room.id, bob.id).await.unwrap(),
        0
    );
    for message in fixture.messages.page_desc(room.id, 1, 50).await.unwrap() {
        assert!(message.is_read_by(bob.id));
        assert!(!message.is_read_by(alice.id));
    }
}

#[tokio::test]
async fn history_pagination_stays_chronological_within_each_page() {
    let fixture = fixture();
    let alice = traveler("Alice");
    let bob = host("Bob");
    let room = seed_room(&fixture, &alice, &bob).await;

    for i in 1..=5 {
        fixture
            .service
            .send(send_request(&room, &alice, &format!("m{i}")))
            .await
            .unwrap();
    }

    // 第一页是最新的两条，页内时间顺序
    let newest = fixture.service.history(room.id, bob.id, 1, 2).await.unwrap();
    let contents: Vec<&str> = newest.iter().map(|m| m.content.as_str()).collect();
    assert_eq!(contents, vec!["m4", "m5"]);

    let older = fixture.service.history(room.id, bob.id, 2, 2).await.unwrap();
    let contents: Vec<&str> = older.iter().map(|m| m.content.as_str()).collect();
    assert_eq!(contents, vec!["m2", "m3"]);
}

#[tokio::test]
async fn history_requires_participation() {
    let fixture = fixture();
    let alice = traveler("Alice");
    let bob = host("Bob");
    let carol = traveler("Carol");
    let room = seed_room(&fixture, &alice, &bob).await;
    fixture.directory.upsert(carol.clone()).await;

    let result = fixture.service.history(room.id, carol.id, 1, 50).await;

    assert!(matches!(
        result,
        Err(ApplicationError::Domain(DomainError::NotAParticipant))
    ));
}

#[tokio::test]
async fn mark_read_is_idempotent_and_emits_once_per_call() {
    let fixture = fixture();
    let alice = traveler("Alice");
    let bob = host("Bob");
    let room = seed_room(&fixture, &alice, &bob).await;

    fixture
        .service
        .send(send_request(&room, &alice, "hello"))
        .await
        .unwrap();

    fixture.service.mark_read(room.id, bob.id).await.unwrap();
    let after_first = fixture.messages.unread_count(room.id, bob.id).await.unwrap();
    fixture.service.mark_read(room.id, bob.id).await.unwrap();
    let after_second = fixture.messages.unread_count(room.id, bob.id).await.unwrap();

    assert_eq!(after_first, 0);
    assert_eq!(after_first, after_second);

    // 每次调用恰好一条 messages-read，发到房间频道
    let receipts: Vec<Delivery> = fixture
        .broadcaster
        .deliveries()
        .into_iter()
        .filter(|delivery| {
            matches!(
                delivery,
                Delivery::Room(_, _, ServerEvent::MessagesRead { .. })
            )
        })
        .collect();
    assert_eq!(receipts.len(), 2);
    match &receipts[0] {
        Delivery::Room(room_id, except, ServerEvent::MessagesRead { reader_id, .. }) => {
            assert_eq!(*room_id, room.id);
            assert!(except.is_none());
            assert_eq!(*reader_id, bob.id);
        }
        other => panic!("unexpected receipt {other:?}"),
    }
}

#[tokio::test]
async fn mark_read_requires_participation() {
    let fixture = fixture();
    let alice = traveler("Alice");
    let bob = host("Bob");
    let carol = traveler("Carol");
    let room = seed_room(&fixture, &alice, &bob).await;
    fixture.directory.upsert(carol.clone()).await;

    let result = fixture.service.mark_read(room.id, carol.id).await;

    assert!(matches!(
        result,
        Err(ApplicationError::Domain(DomainError::NotAParticipant))
    ));
}
