use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Canonical column of the dollar/CPI history, in storage order.
#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Column {
    #[serde(rename = "Fecha")]
    Fecha,
    #[serde(rename = "Cotizacion_Dolar")]
    CotizacionDolar,
    #[serde(rename = "IPC_Gral")]
    IpcGral,
    #[serde(rename = "Var_Porc_IPC_Gral")]
    VarPorcIpcGral,
    #[serde(rename = "IPC_Salud")]
    IpcSalud,
    #[serde(rename = "IPC_Educacion")]
    IpcEducacion,
    #[serde(rename = "IPC_Alimentos_Bebidas")]
    IpcAlimentosBebidas,
    #[serde(rename = "IPC_Transporte")]
    IpcTransporte,
}

impl Column {
    /// Every column in file and table order. `Fecha` is always first.
    pub const ALL: [Column; 8] = [
        Column::Fecha,
        Column::CotizacionDolar,
        Column::IpcGral,
        Column::VarPorcIpcGral,
        Column::IpcSalud,
        Column::IpcEducacion,
        Column::IpcAlimentosBebidas,
        Column::IpcTransporte,
    ];

    /// The indicator columns, i.e. everything but `Fecha`.
    pub const INDICATORS: [Column; 7] = [
        Column::CotizacionDolar,
        Column::IpcGral,
        Column::VarPorcIpcGral,
        Column::IpcSalud,
        Column::IpcEducacion,
        Column::IpcAlimentosBebidas,
        Column::IpcTransporte,
    ];

    pub fn name(self) -> &'static str {
        match self {
            Column::Fecha => "Fecha",
            Column::CotizacionDolar => "Cotizacion_Dolar",
            Column::IpcGral => "IPC_Gral",
            Column::VarPorcIpcGral => "Var_Porc_IPC_Gral",
            Column::IpcSalud => "IPC_Salud",
            Column::IpcEducacion => "IPC_Educacion",
            Column::IpcAlimentosBebidas => "IPC_Alimentos_Bebidas",
            Column::IpcTransporte => "IPC_Transporte",
        }
    }

    /// Position of this column in [`Column::ALL`].
    pub fn position(self) -> usize {
        self as usize
    }

    /// Position among [`Column::INDICATORS`], `None` for `Fecha`.
    pub fn indicator_index(self) -> Option<usize> {
        self.position().checked_sub(1)
    }
}

impl fmt::Display for Column {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Column {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Column::ALL
            .into_iter()
            .find(|c| c.name().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| format!("unknown column '{}'", s))
    }
}
