//! Nearest-airport lookup against the read-only airport geodatabase.
//!
//! The airport database is provisioned separately (FAA NASR-derived) with a
//! single table: `airport(faaid TEXT, icaoid TEXT, name TEXT, lat REAL,
//! lng REAL, alt REAL)`. Lookup is a ±0.1° bounding box pre-filter, then a
//! great-circle minimum over the candidates. A connection is opened per
//! lookup; session starts and landings are rare events.

use rusqlite::{params, Connection, OpenFlags, Result as SqlResult};

use skylog_core::geo;

#[derive(Debug, Clone)]
pub struct Airport {
    pub faa_id: String,
    pub icao_id: String,
    pub name: String,
    pub lat: f64,
    pub lng: f64,
    pub alt: f64,
    pub distance_km: f64,
}

/// Find the nearest airport within ±0.1° of the position. Returns `None`
/// when nothing is inside the box.
pub fn find_airport(db_path: &str, lat: f64, lng: f64) -> SqlResult<Option<Airport>> {
    let conn = Connection::open_with_flags(db_path, OpenFlags::SQLITE_OPEN_READ_ONLY)?;
    find_airport_in(&conn, lat, lng)
}

fn find_airport_in(conn: &Connection, lat: f64, lng: f64) -> SqlResult<Option<Airport>> {
    let mut stmt = conn.prepare(
        "SELECT faaid, icaoid, name, lat, lng, alt FROM airport
         WHERE lat > ?1 AND lat < ?2 AND lng > ?3 AND lng < ?4",
    )?;

    let candidates = stmt.query_map(
        params![lat - 0.1, lat + 0.1, lng - 0.1, lng + 0.1],
        |r| {
            Ok(Airport {
                faa_id: r.get(0)?,
                icao_id: r.get(1)?,
                name: r.get(2)?,
                lat: r.get(3)?,
                lng: r.get(4)?,
                alt: r.get(5)?,
                distance_km: 0.0,
            })
        },
    )?;

    let mut nearest: Option<Airport> = None;
    for candidate in candidates.flatten() {
        let mut apt = candidate;
        apt.distance_km = geo::great_circle_km(lat, lng, apt.lat, apt.lng);
        match &nearest {
            Some(best) if apt.distance_km >= best.distance_km => {}
            _ => nearest = Some(apt),
        }
    }

    Ok(nearest)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn airport_db() -> Connection {
        let conn = Connection::open_in_memory().unwrap();
        conn.execute_batch(
            "CREATE TABLE airport (faaid TEXT, icaoid TEXT, name TEXT, lat REAL, lng REAL, alt REAL);",
        )
        .unwrap();
        let mut stmt = conn
            .prepare("INSERT INTO airport (faaid, icaoid, name, lat, lng, alt) VALUES (?1,?2,?3,?4,?5,?6)")
            .unwrap();
        for (faa, icao, name, lat, lng, alt) in [
            ("AVL", "KAVL", "Asheville Regional", 35.4362, -82.5418, 2165.0),
            ("8NC8", "", "Big Level", 35.4890, -82.5030, 3000.0),
            ("CLT", "KCLT", "Charlotte/Douglas Intl", 35.2140, -80.9431, 748.0),
        ] {
            stmt.execute(params![faa, icao, name, lat, lng, alt]).unwrap();
        }
        drop(stmt);
        conn
    }

    #[test]
    fn test_nearest_airport_selected() {
        let conn = airport_db();
        // On the AVL field: AVL is nearest even though 8NC8 is in the box.
        let apt = find_airport_in(&conn, 35.4360, -82.5400).unwrap().unwrap();
        assert_eq!(apt.faa_id, "AVL");
        assert!(apt.distance_km < 1.0);
    }

    #[test]
    fn test_bounding_box_excludes_distant_fields() {
        let conn = airport_db();
        // Near 8NC8 but outside AVL's practical reach; CLT is far outside
        // the ±0.1° box and must never win.
        let apt = find_airport_in(&conn, 35.4900, -82.5000).unwrap().unwrap();
        assert_eq!(apt.faa_id, "8NC8");
    }

    #[test]
    fn test_empty_box_returns_none() {
        let conn = airport_db();
        let apt = find_airport_in(&conn, 44.0, -100.0).unwrap();
        assert!(apt.is_none());
    }
}
