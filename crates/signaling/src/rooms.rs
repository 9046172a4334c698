//! Raum-Mitgliedschaft – Welche Verbindung ist in welchem Raum
//!
//! Lobby-Raeume und Call-Raeume werden gleich behandelt. Mitglieder eines
//! Raums werden in Beitrittsreihenfolge gehalten; leere Raeume werden
//! sofort entfernt.
//!
//! Neben `raum -> mitglieder` wird ein Rueckwaerts-Index
//! `verbindung -> raeume` gefuehrt, damit ein Disconnect alle Raeume
//! ohne Vollscan verlassen kann. Beide Maps werden nie gleichzeitig
//! gesperrt.

use callrelay_core::{ConnectionId, RoomKey};
use dashmap::DashMap;
use std::sync::Arc;

/// Raum-Mitgliedschaften aller Verbindungen
///
/// Thread-safe via Arc + DashMap. Clone teilt den inneren Zustand.
#[derive(Clone, Default)]
pub struct RoomMembership {
    inner: Arc<RoomMembershipInner>,
}

#[derive(Default)]
struct RoomMembershipInner {
    /// raum -> Mitglieder in Beitrittsreihenfolge
    raeume: DashMap<RoomKey, Vec<ConnectionId>>,
    /// verbindung -> Raeume
    mitgliedschaften: DashMap<ConnectionId, Vec<RoomKey>>,
}

impl RoomMembership {
    /// Erstellt eine leere Mitgliedschaftstabelle
    pub fn neu() -> Self {
        Self::default()
    }

    /// Fuegt eine Verbindung einem Raum hinzu (idempotent)
    ///
    /// Gibt `true` zurueck wenn die Verbindung neu beigetreten ist.
    pub fn beitreten(&self, raum: &RoomKey, id: ConnectionId) -> bool {
        let neu = {
            let mut mitglieder = self.inner.raeume.entry(raum.clone()).or_default();
            if mitglieder.contains(&id) {
                false
            } else {
                mitglieder.push(id);
                true
            }
        };

        if neu {
            let mut raeume = self.inner.mitgliedschaften.entry(id).or_default();
            if !raeume.contains(raum) {
                raeume.push(raum.clone());
            }
            tracing::debug!(connection_id = %id, raum = %raum, "Raum beigetreten");
        }
        neu
    }

    /// Entfernt eine Verbindung aus einem Raum (idempotent)
    ///
    /// Gibt `true` zurueck wenn die Verbindung Mitglied war.
    pub fn verlassen(&self, raum: &RoomKey, id: ConnectionId) -> bool {
        let war_mitglied = self.aus_raum_entfernen(raum, id);

        if let Some(mut raeume) = self.inner.mitgliedschaften.get_mut(&id) {
            raeume.retain(|r| r != raum);
        }
        self.inner
            .mitgliedschaften
            .remove_if(&id, |_, raeume| raeume.is_empty());

        if war_mitglied {
            tracing::debug!(connection_id = %id, raum = %raum, "Raum verlassen");
        }
        war_mitglied
    }

    /// Entfernt eine Verbindung aus allen Raeumen
    ///
    /// Gibt die verlassenen Raeume zurueck.
    pub fn alle_verlassen(&self, id: ConnectionId) -> Vec<RoomKey> {
        let raeume = self
            .inner
            .mitgliedschaften
            .remove(&id)
            .map(|(_, raeume)| raeume)
            .unwrap_or_default();

        for raum in &raeume {
            self.aus_raum_entfernen(raum, id);
        }
        raeume
    }

    /// Mitglieder eines Raums in Beitrittsreihenfolge
    pub fn mitglieder(&self, raum: &RoomKey) -> Vec<ConnectionId> {
        self.inner
            .raeume
            .get(raum)
            .map(|mitglieder| mitglieder.clone())
            .unwrap_or_default()
    }

    /// Raeume einer Verbindung
    pub fn raeume_von(&self, id: ConnectionId) -> Vec<RoomKey> {
        self.inner
            .mitgliedschaften
            .get(&id)
            .map(|raeume| raeume.clone())
            .unwrap_or_default()
    }

    /// Prueft ob eine Verbindung Mitglied eines Raums ist
    pub fn ist_mitglied(&self, raum: &RoomKey, id: ConnectionId) -> bool {
        self.inner
            .raeume
            .get(raum)
            .map(|mitglieder| mitglieder.contains(&id))
            .unwrap_or(false)
    }

    /// Anzahl nicht-leerer Raeume
    pub fn raum_anzahl(&self) -> usize {
        self.inner.raeume.len()
    }

    fn aus_raum_entfernen(&self, raum: &RoomKey, id: ConnectionId) -> bool {
        let war_mitglied = match self.inner.raeume.get_mut(raum) {
            Some(mut mitglieder) => {
                let vorher = mitglieder.len();
                mitglieder.retain(|m| *m != id);
                mitglieder.len() != vorher
            }
            None => false,
        };
        self.inner
            .raeume
            .remove_if(raum, |_, mitglieder| mitglieder.is_empty());
        war_mitglied
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn raum(name: &str) -> RoomKey {
        RoomKey::from(name)
    }

    #[test]
    fn beitreten_in_reihenfolge_und_idempotent() {
        let rooms = RoomMembership::neu();
        let a = ConnectionId::new();
        let b = ConnectionId::new();

        assert!(rooms.beitreten(&raum("L"), a));
        assert!(rooms.beitreten(&raum("L"), b));
        assert!(!rooms.beitreten(&raum("L"), a));

        assert_eq!(rooms.mitglieder(&raum("L")), vec![a, b]);
        assert_eq!(rooms.raeume_von(a), vec![raum("L")]);
    }

    #[test]
    fn leerer_raum_verschwindet() {
        let rooms = RoomMembership::neu();
        let a = ConnectionId::new();
        rooms.beitreten(&raum("R1"), a);
        assert_eq!(rooms.raum_anzahl(), 1);

        assert!(rooms.verlassen(&raum("R1"), a));
        assert_eq!(rooms.raum_anzahl(), 0);
        assert!(rooms.mitglieder(&raum("R1")).is_empty());
        assert!(rooms.raeume_von(a).is_empty());
    }

    #[test]
    fn verlassen_ohne_mitgliedschaft() {
        let rooms = RoomMembership::neu();
        assert!(!rooms.verlassen(&raum("X"), ConnectionId::new()));
        assert_eq!(rooms.raum_anzahl(), 0);
    }

    #[test]
    fn alle_verlassen_raeumt_jeden_raum() {
        let rooms = RoomMembership::neu();
        let a = ConnectionId::new();
        let b = ConnectionId::new();
        rooms.beitreten(&raum("L"), a);
        rooms.beitreten(&raum("L"), b);
        rooms.beitreten(&raum("R1"), a);

        let verlassen = rooms.alle_verlassen(a);
        assert_eq!(verlassen, vec![raum("L"), raum("R1")]);
        assert_eq!(rooms.mitglieder(&raum("L")), vec![b]);
        assert!(!rooms.ist_mitglied(&raum("R1"), a));
        assert_eq!(rooms.raum_anzahl(), 1);

        assert!(rooms.alle_verlassen(a).is_empty());
    }

    #[test]
    fn mehrere_raeume_pro_verbindung() {
        let rooms = RoomMembership::neu();
        let a = ConnectionId::new();
        rooms.beitreten(&raum("L"), a);
        rooms.beitreten(&raum("R1"), a);
        rooms.verlassen(&raum("R1"), a);
        assert!(rooms.ist_mitglied(&raum("L"), a));
        assert_eq!(rooms.raeume_von(a), vec![raum("L")]);
    }
}
