//! Presence-Broadcaster – Mitgliederlisten an einen Raum senden
//!
//! Nach jeder Aenderung einer Raum-Mitgliedschaft wird allen Mitgliedern
//! des Raums die vollstaendige Mitgliederliste geschickt. Es gibt zwei
//! Varianten:
//!
//! - `UserList` fuer Lobby-Raeume (`user-list { userList }`)
//! - `RoomJoined` fuer Call-Raeume (`phone-answer { socketId, userList }`)
//!
//! Die Liste wird beim Senden aus der aktuellen Mitgliedschaft berechnet
//! (Beitrittsreihenfolge). Mitglieder ohne Registry-Eintrag werden
//! uebersprungen.

use callrelay_core::{ConnectionId, RoomKey};
use callrelay_protocol::events::{PeerRef, RoomJoinedMessage, ServerEvent, UserListMessage};

use crate::delivery::DeliveryHub;
use crate::registry::ConnectionRegistry;
use crate::rooms::RoomMembership;

/// Art der Mitgliedschafts-Nachricht
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MembershipEventKind {
    /// Lobby-Liste
    UserList,
    /// Call-Raum-Liste nach einer Annahme
    RoomJoined,
}

/// Sendet Mitgliederlisten an alle Mitglieder eines Raums
#[derive(Clone)]
pub struct PresenceBroadcaster {
    registry: ConnectionRegistry,
    rooms: RoomMembership,
    delivery: DeliveryHub,
}

impl PresenceBroadcaster {
    pub fn neu(registry: ConnectionRegistry, rooms: RoomMembership, delivery: DeliveryHub) -> Self {
        Self {
            registry,
            rooms,
            delivery,
        }
    }

    /// Aktuelle Mitgliederliste eines Raums in Beitrittsreihenfolge
    pub fn mitgliederliste(&self, raum: &RoomKey) -> Vec<PeerRef> {
        self.rooms
            .mitglieder(raum)
            .iter()
            .filter_map(|id| self.registry.peer(id))
            .collect()
    }

    /// Sendet die Mitgliederliste an alle aktuellen Mitglieder des Raums
    ///
    /// `ausloeser` ist die Verbindung, deren Beitritt/Austritt die Nachricht
    /// ausgeloest hat (bei `RoomJoined` als `socketId` mitgesendet).
    /// Gibt die Anzahl erfolgreicher Zustellungen zurueck.
    pub fn broadcast_membership(
        &self,
        raum: &RoomKey,
        art: MembershipEventKind,
        ausloeser: ConnectionId,
    ) -> usize {
        let empfaenger = self.rooms.mitglieder(raum);
        if empfaenger.is_empty() {
            return 0;
        }

        let user_list: Vec<PeerRef> = empfaenger
            .iter()
            .filter_map(|id| self.registry.peer(id))
            .collect();

        let event = match art {
            MembershipEventKind::UserList => ServerEvent::UserList(UserListMessage { user_list }),
            MembershipEventKind::RoomJoined => ServerEvent::RoomJoined(RoomJoinedMessage {
                socket_id: ausloeser,
                user_list,
            }),
        };

        let zugestellt = self.delivery.an_mehrere_senden(&empfaenger, &event);
        tracing::debug!(
            raum = %raum,
            event = event.name(),
            empfaenger = empfaenger.len(),
            zugestellt,
            "Mitgliederliste gesendet"
        );
        zugestellt
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use callrelay_observability::RelayMetrics;

    struct Aufbau {
        registry: ConnectionRegistry,
        rooms: RoomMembership,
        delivery: DeliveryHub,
        presence: PresenceBroadcaster,
    }

    fn aufbau() -> Aufbau {
        let registry = ConnectionRegistry::neu();
        let rooms = RoomMembership::neu();
        let delivery = DeliveryHub::neu(RelayMetrics::neu().unwrap());
        let presence = PresenceBroadcaster::neu(registry.clone(), rooms.clone(), delivery.clone());
        Aufbau {
            registry,
            rooms,
            delivery,
            presence,
        }
    }

    fn verbinden(
        a: &Aufbau,
        name: &str,
        raum: &RoomKey,
    ) -> (ConnectionId, tokio::sync::mpsc::Receiver<ServerEvent>) {
        let id = ConnectionId::new();
        let rx = a.delivery.client_registrieren(id);
        a.registry.registrieren(id, name.into(), raum.clone());
        a.rooms.beitreten(raum, id);
        (id, rx)
    }

    #[test]
    fn user_list_an_alle_lobby_mitglieder() {
        let a = aufbau();
        let lobby = RoomKey::from("L");
        let (id_a, mut rx_a) = verbinden(&a, "alice", &lobby);
        let (id_b, mut rx_b) = verbinden(&a, "bob", &lobby);

        let n = a
            .presence
            .broadcast_membership(&lobby, MembershipEventKind::UserList, id_b);
        assert_eq!(n, 2);

        for rx in [&mut rx_a, &mut rx_b] {
            match rx.try_recv().unwrap() {
                ServerEvent::UserList(m) => {
                    let ids: Vec<_> = m.user_list.iter().map(|p| p.socket_id).collect();
                    assert_eq!(ids, vec![id_a, id_b]);
                }
                andere => panic!("Erwartet user-list, erhalten {}", andere.name()),
            }
        }
    }

    #[test]
    fn room_joined_traegt_ausloeser() {
        let a = aufbau();
        let raum = RoomKey::from("R1");
        let (id_a, mut rx_a) = verbinden(&a, "alice", &raum);
        let (id_b, _rx_b) = verbinden(&a, "bob", &raum);

        a.presence
            .broadcast_membership(&raum, MembershipEventKind::RoomJoined, id_b);
        match rx_a.try_recv().unwrap() {
            ServerEvent::RoomJoined(m) => {
                assert_eq!(m.socket_id, id_b);
                assert_eq!(m.user_list.len(), 2);
                assert_eq!(m.user_list[0].socket_id, id_a);
            }
            andere => panic!("Erwartet phone-answer, erhalten {}", andere.name()),
        }
    }

    #[test]
    fn leerer_raum_sendet_nichts() {
        let a = aufbau();
        let n = a.presence.broadcast_membership(
            &RoomKey::from("leer"),
            MembershipEventKind::UserList,
            ConnectionId::new(),
        );
        assert_eq!(n, 0);
    }

    #[test]
    fn mitglieder_ohne_registry_eintrag_werden_uebersprungen() {
        let a = aufbau();
        let lobby = RoomKey::from("L");
        let (_id_a, _rx) = verbinden(&a, "alice", &lobby);
        let geist = ConnectionId::new();
        a.rooms.beitreten(&lobby, geist);

        assert_eq!(a.presence.mitgliederliste(&lobby).len(), 1);
    }
}
