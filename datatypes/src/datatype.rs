use serde::de::{Deserialize, Deserializer, Error, Visitor};
use std::fmt;
use std::str::FromStr;

/// Benchmark payload kinds.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum DataType {
    /// `Vec<i32>`, direct path
    Simple,
    /// `Vec` of a flat struct, direct path
    ComplexNoncompound,
    /// `Vec` of a struct owning a `Vec`, portable path
    ComplexCompound,
}

const ALLOWED: &[&str] = &["simple", "complex-noncompound", "complex-compound"];

impl DataType {
    pub const ALL: [DataType; 3] = [
        DataType::Simple,
        DataType::ComplexNoncompound,
        DataType::ComplexCompound,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            DataType::Simple => ALLOWED[0],
            DataType::ComplexNoncompound => ALLOWED[1],
            DataType::ComplexCompound => ALLOWED[2],
        }
    }
}

impl fmt::Display for DataType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DataType {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        DataType::ALL
            .into_iter()
            .find(|datatype| datatype.as_str() == value)
            .ok_or_else(|| format!("invalid data type {:?}, expected one of {:?}", value, ALLOWED))
    }
}

struct DataTypeVisitor;

impl<'de> Visitor<'de> for DataTypeVisitor {
    type Value = DataType;

    fn expecting(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(formatter, "a string value from {:?}", ALLOWED)
    }

    fn visit_str<E>(self, v: &str) -> Result<Self::Value, E>
    where
        E: Error,
    {
        v.parse().map_err(|_| E::unknown_variant(v, ALLOWED))
    }
}

impl<'de> Deserialize<'de> for DataType {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        deserializer.deserialize_str(DataTypeVisitor)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_names() {
        for datatype in DataType::ALL {
            assert_eq!(datatype.to_string().parse::<DataType>().unwrap(), datatype);
        }
        assert!("compound".parse::<DataType>().is_err());
    }

    #[test]
    fn deserialize_from_yaml() {
        let datatype: DataType = serde_yaml::from_str("complex-compound").unwrap();
        assert_eq!(datatype, DataType::ComplexCompound);
        assert!(serde_yaml::from_str::<DataType>("matrix").is_err());
    }
}
