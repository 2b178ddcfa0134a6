//! Reader for WKT coordinate system definitions, the format of shapefile `.prj`
//! sidecars, and their translation into PROJ strings.
//!
//! Only WKT1 projected and geographic systems are translated. WKT2 definitions
//! resolve through their `ID["EPSG", ...]` instead.

use crate::error::{PipelineError, Result};

#[derive(Debug, Clone, PartialEq)]
pub enum WktValue {
    Text(String),
    Number(f64),
    Node(WktNode),
}

/// One `KEYWORD[...]` element
#[derive(Debug, Clone, PartialEq)]
pub struct WktNode {
    pub keyword: String,
    pub values: Vec<WktValue>,
}

impl WktNode {
    pub fn parse(text: &str) -> Result<Self> {
        let mut parser = Parser { text, pos: 0 };
        let node = match parser.value()? {
            WktValue::Node(node) => node,
            _ => return Err(parser.error("expected a WKT element")),
        };
        parser.skip_whitespace();
        if parser.pos < text.len() {
            return Err(parser.error("trailing characters"));
        }
        Ok(node)
    }

    pub fn children<'s>(&'s self, keyword: &'s str) -> impl Iterator<Item = &'s WktNode> + 's {
        self.values.iter().filter_map(move |value| match value {
            WktValue::Node(node) if node.keyword.eq_ignore_ascii_case(keyword) => Some(node),
            _ => None,
        })
    }

    pub fn child<'s>(&'s self, keyword: &'s str) -> Option<&'s WktNode> {
        self.children(keyword).next()
    }

    /// Depth-first search for the first element with any of the keywords
    pub fn find(&self, keywords: &[&str]) -> Option<&WktNode> {
        if keywords.iter().any(|k| self.keyword.eq_ignore_ascii_case(k)) {
            return Some(self);
        }
        self.values.iter().find_map(|value| match value {
            WktValue::Node(node) => node.find(keywords),
            _ => None,
        })
    }

    pub fn text(&self, index: usize) -> Option<&str> {
        match self.values.get(index) {
            Some(WktValue::Text(text)) => Some(text),
            _ => None,
        }
    }

    pub fn number(&self, index: usize) -> Option<f64> {
        match self.values.get(index) {
            Some(WktValue::Number(number)) => Some(*number),
            Some(WktValue::Text(text)) => text.trim().parse().ok(),
            _ => None,
        }
    }

    pub fn name(&self) -> Option<&str> {
        self.text(0)
    }

    /// Value of a `PARAMETER["name", value]` child, matching names loosely
    pub fn parameter(&self, names: &[&str]) -> Option<f64> {
        self.children("PARAMETER").find_map(|parameter| {
            let name = loose(parameter.name()?);
            names
                .iter()
                .any(|candidate| loose(candidate) == name)
                .then(|| parameter.number(1))
                .flatten()
        })
    }

    /// EPSG code from a direct `AUTHORITY` (WKT1) or `ID` (WKT2) child
    pub fn epsg_code(&self) -> Option<u16> {
        self.children("AUTHORITY")
            .chain(self.children("ID"))
            .find(|authority| {
                authority
                    .name()
                    .is_some_and(|name| name.eq_ignore_ascii_case("EPSG"))
            })
            .and_then(|authority| authority.number(1))
            .filter(|code| code.fract() == 0.0 && *code > 0.0 && *code <= f64::from(u16::MAX))
            .map(|code| code as u16)
    }

    /// Translate into a PROJ string
    pub fn to_proj_string(&self) -> Result<String> {
        match self.keyword.as_str() {
            "PROJCS" => self.projected(),
            "GEOGCS" | "GEOGCRS" | "GEODCRS" | "GEOGRAPHICCRS" => {
                Ok(format!("+proj=longlat {} +no_defs", self.ellipsoid()?))
            }
            other => Err(PipelineError::UnsupportedCrs(format!(
                "WKT {} definition without an EPSG identifier",
                other
            ))),
        }
    }

    fn ellipsoid(&self) -> Result<String> {
        let spheroid = self
            .find(&["SPHEROID", "ELLIPSOID"])
            .ok_or_else(|| unsupported(self, "no SPHEROID"))?;
        let a = spheroid
            .number(1)
            .ok_or_else(|| unsupported(self, "SPHEROID without a semi-major axis"))?;
        Ok(match spheroid.number(2) {
            Some(rf) if rf != 0.0 => format!("+a={} +rf={}", a, rf),
            _ => format!("+a={} +b={}", a, a),
        })
    }

    fn projected(&self) -> Result<String> {
        let method = self
            .child("PROJECTION")
            .and_then(WktNode::name)
            .ok_or_else(|| unsupported(self, "no PROJECTION"))?;
        // False origin is stated in the linear unit; PROJ wants metres
        let unit = self.child("UNIT").and_then(|unit| unit.number(1)).unwrap_or(1.0);
        let param = |names: &[&str], default: f64| self.parameter(names).unwrap_or(default);

        let lat_0 = param(&["latitude_of_origin", "latitude_of_center"], 0.0);
        let lon_0 = param(
            &["central_meridian", "longitude_of_center", "longitude_of_origin"],
            0.0,
        );
        let k = param(&["scale_factor"], 1.0);
        let x_0 = param(&["false_easting"], 0.0) * unit;
        let y_0 = param(&["false_northing"], 0.0) * unit;

        let projection = match loose(method).as_str() {
            "lambert_conformal_conic" | "lambert_conformal_conic_2sp" => {
                let lat_1 = self.parameter(&["standard_parallel_1"]).unwrap_or(lat_0);
                let lat_2 = self.parameter(&["standard_parallel_2"]).unwrap_or(lat_1);
                format!(
                    "+proj=lcc +lat_1={} +lat_2={} +lat_0={} +lon_0={}",
                    lat_1, lat_2, lat_0, lon_0
                )
            }
            "lambert_conformal_conic_1sp" => format!(
                "+proj=lcc +lat_1={} +lat_0={} +lon_0={} +k_0={}",
                lat_0, lat_0, lon_0, k
            ),
            "transverse_mercator" | "gauss_kruger" => {
                format!("+proj=tmerc +lat_0={} +lon_0={} +k={}", lat_0, lon_0, k)
            }
            "mercator" | "mercator_1sp" => format!("+proj=merc +lon_0={} +k={}", lon_0, k),
            "mercator_2sp" => format!(
                "+proj=merc +lon_0={} +lat_ts={}",
                lon_0,
                param(&["standard_parallel_1"], 0.0)
            ),
            "mercator_auxiliary_sphere" | "popular_visualisation_pseudo_mercator" => {
                let a = self
                    .find(&["SPHEROID", "ELLIPSOID"])
                    .and_then(|spheroid| spheroid.number(1))
                    .unwrap_or(6_378_137.0);
                return Ok(format!(
                    "+proj=merc +a={} +b={} +lon_0={} +x_0={} +y_0={} +to_meter={} +no_defs",
                    a, a, lon_0, x_0, y_0, unit
                ));
            }
            other => {
                return Err(unsupported(
                    self,
                    &format!("projection method {} is not supported", other),
                ))
            }
        };

        Ok(format!(
            "{} +x_0={} +y_0={} {} +to_meter={} +no_defs",
            projection,
            x_0,
            y_0,
            self.ellipsoid()?,
            unit
        ))
    }
}

fn loose(name: &str) -> String {
    name.trim().to_ascii_lowercase().replace(' ', "_")
}

fn unsupported(node: &WktNode, reason: &str) -> PipelineError {
    PipelineError::UnsupportedCrs(format!(
        "{}: {}",
        node.name().unwrap_or(&node.keyword),
        reason
    ))
}

struct Parser<'a> {
    text: &'a str,
    pos: usize,
}

impl Parser<'_> {
    fn peek(&self) -> Option<char> {
        self.text[self.pos..].chars().next()
    }

    fn skip_whitespace(&mut self) {
        while let Some(c) = self.peek().filter(|c| c.is_whitespace()) {
            self.pos += c.len_utf8();
        }
    }

    fn error(&self, reason: &str) -> PipelineError {
        PipelineError::UnsupportedCrs(format!("malformed WKT at offset {}: {}", self.pos, reason))
    }

    fn value(&mut self) -> Result<WktValue> {
        self.skip_whitespace();
        match self.peek() {
            Some('"') => self.quoted().map(WktValue::Text),
            Some(c) if c.is_ascii_digit() || matches!(c, '-' | '+' | '.') => {
                self.number().map(WktValue::Number)
            }
            Some(c) if c.is_ascii_alphabetic() => self.element(),
            _ => Err(self.error("unexpected character")),
        }
    }

    /// A keyword with a bracketed body, or a bare enumeration word such as `EAST`
    fn element(&mut self) -> Result<WktValue> {
        let start = self.pos;
        while self
            .peek()
            .is_some_and(|c| c.is_ascii_alphanumeric() || c == '_')
        {
            self.pos += 1;
        }
        let keyword = self.text[start..self.pos].to_ascii_uppercase();

        self.skip_whitespace();
        let close = match self.peek() {
            Some('[') => ']',
            Some('(') => ')',
            _ => return Ok(WktValue::Text(keyword)),
        };
        self.pos += 1;

        let mut values = Vec::new();
        loop {
            self.skip_whitespace();
            match self.peek() {
                Some(c) if c == close => {
                    self.pos += 1;
                    break;
                }
                Some(',') => self.pos += 1,
                Some(_) => values.push(self.value()?),
                None => return Err(self.error("unterminated element")),
            }
        }
        Ok(WktValue::Node(WktNode { keyword, values }))
    }

    fn quoted(&mut self) -> Result<String> {
        self.pos += 1;
        let mut out = String::new();
        loop {
            let c = self.peek().ok_or_else(|| self.error("unterminated string"))?;
            self.pos += c.len_utf8();
            if c == '"' {
                // Doubled quote is an escaped quote
                if self.peek() == Some('"') {
                    self.pos += 1;
                    out.push('"');
                    continue;
                }
                return Ok(out);
            }
            out.push(c);
        }
    }

    fn number(&mut self) -> Result<f64> {
        let start = self.pos;
        while self
            .peek()
            .is_some_and(|c| c.is_ascii_digit() || matches!(c, '-' | '+' | '.' | 'e' | 'E'))
        {
            self.pos += 1;
        }
        self.text[start..self.pos]
            .parse()
            .map_err(|_| self.error("invalid number"))
    }
}
