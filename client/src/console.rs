//! Konsolen-Eingabe und -Ausgabe
//!
//! Eine Zeile ist ein Befehl. Argumente werden an Leerzeichen getrennt,
//! nur der Titel von `broadcast` darf Leerzeichen enthalten.

use relaycast_api::StreamRecord;
use relaycast_core::event::BroadcastEndGrund;
use relaycast_core::{ClientEvent, DirectoryEntry, Identity};
use thiserror::Error;

pub const HILFE: &str = "\
Befehle:
  list                       Broadcaster anzeigen
  watch <name>               Uebertragung ansehen
  unwatch <name>             Zuschauen beenden
  broadcast [titel]          Eigene Uebertragung starten
  stop                       Eigene Uebertragung beenden
  revoke                     Aufnahme entziehen (wie Freigabe im OS beendet)
  history                    Verlauf neu laden
  more                       Naechste Verlaufsseite
  rename <neu> <passwort>    Benutzernamen aendern
  password <alt> <neu>       Passwort aendern
  help                       Diese Hilfe
  quit                       Abmelden und beenden";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Befehl {
    List,
    Watch(Identity),
    Unwatch(Identity),
    Broadcast { title: Option<String> },
    Stop,
    /// Die Aufnahmequelle faellt weg
    Revoke,
    History,
    More,
    Rename { new: Identity, password: String },
    Password { old: String, new: String },
    Help,
    Quit,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum EingabeFehler {
    #[error("Unbekannter Befehl '{0}' (help zeigt alle Befehle)")]
    Unbekannt(String),

    #[error("{befehl}: {argument} fehlt")]
    ArgumentFehlt {
        befehl: &'static str,
        argument: &'static str,
    },

    #[error("{befehl}: zu viele Argumente")]
    ZuVieleArgumente { befehl: &'static str },

    #[error("Ungueltiger Name: {0}")]
    Name(String),
}

/// Parst eine Eingabezeile. Leere Zeilen ergeben `None`.
pub fn parsen(zeile: &str) -> Result<Option<Befehl>, EingabeFehler> {
    let zeile = zeile.trim();
    let (wort, rest) = match zeile.split_once(char::is_whitespace) {
        Some((wort, rest)) => (wort, rest.trim()),
        None => (zeile, ""),
    };
    let argumente: Vec<&str> = rest.split_whitespace().collect();

    let befehl = match wort {
        "" => return Ok(None),
        "list" => ohne_argumente("list", &argumente, Befehl::List)?,
        "watch" => Befehl::Watch(name("watch", &argumente)?),
        "unwatch" => Befehl::Unwatch(name("unwatch", &argumente)?),
        "broadcast" => Befehl::Broadcast {
            title: (!rest.is_empty()).then(|| rest.to_string()),
        },
        "stop" => ohne_argumente("stop", &argumente, Befehl::Stop)?,
        "revoke" => ohne_argumente("revoke", &argumente, Befehl::Revoke)?,
        "history" => ohne_argumente("history", &argumente, Befehl::History)?,
        "more" => ohne_argumente("more", &argumente, Befehl::More)?,
        "rename" => {
            let [neu, passwort] = zwei("rename", &argumente, ["neuer Name", "Passwort"])?;
            Befehl::Rename {
                new: Identity::parse(neu).map_err(|e| EingabeFehler::Name(e.to_string()))?,
                password: passwort.to_string(),
            }
        }
        "password" => {
            let [alt, neu] = zwei("password", &argumente, ["altes Passwort", "neues Passwort"])?;
            Befehl::Password {
                old: alt.to_string(),
                new: neu.to_string(),
            }
        }
        "help" | "?" => Befehl::Help,
        "quit" | "exit" => Befehl::Quit,
        anderes => return Err(EingabeFehler::Unbekannt(anderes.to_string())),
    };
    Ok(Some(befehl))
}

fn ohne_argumente(
    befehl: &'static str,
    argumente: &[&str],
    ergebnis: Befehl,
) -> Result<Befehl, EingabeFehler> {
    if argumente.is_empty() {
        Ok(ergebnis)
    } else {
        Err(EingabeFehler::ZuVieleArgumente { befehl })
    }
}

fn name(befehl: &'static str, argumente: &[&str]) -> Result<Identity, EingabeFehler> {
    match argumente {
        [] => Err(EingabeFehler::ArgumentFehlt {
            befehl,
            argument: "Name",
        }),
        [name] => Identity::parse(name).map_err(|e| EingabeFehler::Name(e.to_string())),
        _ => Err(EingabeFehler::ZuVieleArgumente { befehl }),
    }
}

fn zwei<'a>(
    befehl: &'static str,
    argumente: &[&'a str],
    namen: [&'static str; 2],
) -> Result<[&'a str; 2], EingabeFehler> {
    match argumente {
        [a, b] => Ok([*a, *b]),
        [] => Err(EingabeFehler::ArgumentFehlt {
            befehl,
            argument: namen[0],
        }),
        [_] => Err(EingabeFehler::ArgumentFehlt {
            befehl,
            argument: namen[1],
        }),
        _ => Err(EingabeFehler::ZuVieleArgumente { befehl }),
    }
}

// ---------------------------------------------------------------------------
// Ausgabe
// ---------------------------------------------------------------------------

/// Eine Zeile pro UI-Event
pub fn event_text(event: &ClientEvent) -> String {
    match event {
        ClientEvent::VerbindungGeaendert { state } => format!("* Verbindung: {state}"),
        ClientEvent::VerzeichnisGeaendert { entries } => {
            format!("* Broadcaster: {}", verzeichnis_kurz(entries))
        }
        ClientEvent::ZuschauerGeaendert { identity, count } => {
            format!("* {identity}: {count} Zuschauer")
        }
        ClientEvent::BroadcastGestartet { title } => match title {
            Some(title) => format!("* Uebertragung gestartet: {title}"),
            None => "* Uebertragung gestartet".to_string(),
        },
        ClientEvent::BroadcastBeendet { grund } => format!(
            "* Uebertragung beendet ({})",
            match grund {
                BroadcastEndGrund::Benutzer => "gestoppt",
                BroadcastEndGrund::CaptureBeendet => "Aufnahme beendet",
                BroadcastEndGrund::Logout => "abgemeldet",
            }
        ),
        ClientEvent::RemoteMedienGestartet { identity } => {
            format!("* Empfange Uebertragung von {identity}")
        }
        ClientEvent::VorschauEntfernt { identity } => format!("* Vorschau von {identity} entfernt"),
        ClientEvent::IdentitaetUmbenannt { old, new, local } => {
            if *local {
                format!("* Du heisst jetzt {new}")
            } else {
                format!("* {old} heisst jetzt {new}")
            }
        }
    }
}

fn verzeichnis_kurz(entries: &[DirectoryEntry]) -> String {
    if entries.is_empty() {
        return "keine".to_string();
    }
    entries
        .iter()
        .map(|e| format!("{} ({})", e.identity, e.viewer_count))
        .collect::<Vec<_>>()
        .join(", ")
}

/// Ausgabe fuer `list`
pub fn verzeichnis_text(entries: &[DirectoryEntry]) -> String {
    if entries.is_empty() {
        return "Niemand uebertraegt gerade.".to_string();
    }
    entries
        .iter()
        .map(|e| format!("  {:<24} {:>4} Zuschauer", e.identity.as_str(), e.viewer_count))
        .collect::<Vec<_>>()
        .join("\n")
}

/// Eine Zeile im Verlauf
pub fn verlauf_zeile(stream: &StreamRecord) -> String {
    let dauer = stream
        .dauer()
        .map(|d| format!("{} min", d.num_minutes()))
        .unwrap_or_else(|| "laeuft".to_string());
    format!(
        "  {} {:<16} {:<24} {:>8} {:>4} Zuschauer",
        stream.started_at.format("%Y-%m-%d %H:%M"),
        stream.broadcaster.username,
        stream.title.as_deref().unwrap_or("-"),
        dauer,
        stream.viewer_count
    )
}
