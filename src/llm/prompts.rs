// Instruction sets sent ahead of the documents in the generate call.

use crate::error::{AnalysisError, Result};
use std::path::Path;

pub const CREDIT_RISK_PROMPT: &str = r#"
        Actúa como un Vicepresidente de Riesgo de Crédito Senior.
        Analiza la información contenida en LOS DOCUMENTOS ADJUNTOS.
        
        Tu trabajo es UNIFICAR la información, identificar las fechas de corte de cada documento y realizar el análisis comparativo.

        Sigue ESTRICTAMENTE estas reglas de negocio para el informe:

        === 1. NORMALIZACIÓN DE PERIODOS ===
        - Identifica las fechas de los documentos.
        - Si comparas un CORTE (ej. Junio) vs un AÑO COMPLETO (Dic):
          * Para Crecimiento en Ventas: Calcula el PROMEDIO MENSUAL de cada periodo y compara esos promedios.

        === 2. CÁLCULO DEL SCORE (VARIABLES 1 a 7 PUNTOS) ===
        Calcula cada indicador. Si cumple = 7 pts, Si no = 0 o 1 pt (según se indique).

        1. Crecimiento Ventas (>Inflación/10%): SI=7 | NO=0
        2. Crecimiento Margen Bruto (>= año anterior): SI=7 | NO=1
        3. Margen Operacional (Positivo): SI=7 | NO=0
        4. Endeudamiento (Saludable <70%): SI=7 | NO=0
        5. Razón Corriente (>0.9): SI=7 | NO=0
        6. Capital Pagado (>10% del Patrimonio): SI=7 | NO=0
        7. Utilidad Acumulada (Positiva): SI=7 | NO=0
        8. Rotación CXC (<=90 días): SI=7 | NO=0
        9. Rotación CXP (<=120 días): SI=7 | NO=0
        10. Relación Rotaciones (Días CXC > Días CXP): SI=7 | NO=0
        11. Tamaño Empresa (Ventas Anuales Proyectadas):
            - >10.000MM = 7 pts
            - 3.000-10.000MM = 3 pts
            - <3.000MM = 0 pts
        12. Capital de Trabajo (Positivo): SI=7 | NO=0

        --- PENALIZACIÓN ---
        13. Patrimonio Negativo: Si existe, RESTA 14 PUNTOS a la suma total de puntos antes de promediar.

        >>> CÁLCULO SCORE FINAL = (Suma de puntos - Penalizaciones) / 12.

        === 3. SUGERENCIA DE LÍNEA (Orden de Prioridad) ===
        A. "FACTORING ENDOSO CON PAGADORES AAA": 
           - Sugerir SI: Score < 3 OR Margen Op Negativo OR Patrimonio Negativo OR Endeudamiento > 80%.
        
        B. "CONFIRMING": 
           - Sugerir SI: Score entre 6 y 7 AND Ventas Anuales > 30.000 Millones AND No tiene causales de línea A.
           - NOTA OBLIGATORIA: "Sujeto a estudio de endosables como fuente de pago y calidad de clientes en facturacion".
        
        C. "FACTORING": 
           - Sugerir en cualquier otro caso (ej: Score 3-5.9, o Score alto con ventas bajas).

        === 4. CUPO SUGERIDO ===
        - Base de cálculo: Ventas de UN MES (Promedio del último periodo disponible).
        - Si la línea es Factoring Endoso AAA: Cupo = 20% de un mes.
        - Si la línea es Factoring/Confirming: Cupo = 100% de un mes.
        - TOPE MÁXIMO GLOBAL: 5.000 Millones de pesos. (Si el cálculo da más, ajusta a 5.000).
        - Si cupo > 500 Millones: Agregar nota "Sujeto a castigo por sector según tabla".

        === SALIDA ===
        Genera un informe ejecutivo limpio en formato Markdown.
        Estructura requerida:
        1. **Detalle del Score:** Lista los 12 indicadores, mostrando el Valor Real calculado y los Puntos asignados. Muestra la penalización si aplica.
        2. **Resultados Finales:** Score Final (1 decimal) y Nivel de Riesgo (Bajo/Medio/Alto).
        3. **Estructuración:** Línea Sugerida (con notas si aplican) y Cupo Sugerido (Valor en millones COP).
        4. **Alertas:** Lista de alertas detectadas (Patrimonio negativo, iliquidez, etc).
        "#;

/// English rendering of [`CREDIT_RISK_PROMPT`]; the report comes back in English.
pub const CREDIT_RISK_PROMPT_EN: &str = r#"
Act as a Senior Vice President of Credit Risk.
Analyze the information contained in THE ATTACHED DOCUMENTS.

Your job is to UNIFY the information, identify the cut-off date of each document and perform the comparative analysis.

Follow these business rules STRICTLY for the report:

=== 1. PERIOD NORMALIZATION ===
- Identify the dates of the documents.
- If you compare a PARTIAL period (e.g. June) against a FULL YEAR (December):
  * For Sales Growth: compute the MONTHLY AVERAGE of each period and compare those averages.

=== 2. SCORE CALCULATION (7-POINT VARIABLES) ===
Compute every indicator. If it complies = 7 pts, otherwise 0 or 1 pt (as stated).

1. Sales Growth (> inflation / 10%): YES=7 | NO=0
2. Gross Margin Growth (>= previous year): YES=7 | NO=1
3. Operating Margin (positive): YES=7 | NO=0
4. Leverage (healthy < 70%): YES=7 | NO=0
5. Current Ratio (> 0.9): YES=7 | NO=0
6. Paid-in Capital (> 10% of equity): YES=7 | NO=0
7. Retained Earnings (positive): YES=7 | NO=0
8. Receivables Turnover (<= 90 days): YES=7 | NO=0
9. Payables Turnover (<= 120 days): YES=7 | NO=0
10. Turnover Relationship (receivable days > payable days): YES=7 | NO=0
11. Company Size (projected annual sales):
    - > 10,000 million = 7 pts
    - 3,000 - 10,000 million = 3 pts
    - < 3,000 million = 0 pts
12. Working Capital (positive): YES=7 | NO=0

--- PENALTY ---
13. Negative Equity: if present, SUBTRACT 14 POINTS from the total before averaging.

>>> FINAL SCORE = (Sum of points - Penalties) / 12.

=== 3. SUGGESTED CREDIT LINE (priority order) ===
A. "FACTORING WITH AAA PAYER ENDORSEMENT":
   - Suggest IF: Score < 3 OR negative operating margin OR negative equity OR leverage > 80%.

B. "CONFIRMING":
   - Suggest IF: Score between 6 and 7 AND annual sales > 30,000 million AND none of the line A conditions apply.
   - MANDATORY NOTE: "Subject to review of endorsable receivables as source of payment and quality of invoiced clients".

C. "FACTORING":
   - Suggest in every other case (e.g. score 3-5.9, or high score with low sales).

=== 4. SUGGESTED LIMIT ===
- Calculation base: sales of ONE MONTH (average of the latest available period).
- AAA Endorsement Factoring: limit = 20% of one month.
- Factoring / Confirming: limit = 100% of one month.
- GLOBAL CAP: 5,000 million pesos (if the calculation exceeds it, cap at 5,000).
- If the limit > 500 million: add the note "Subject to sector haircut per table".

=== OUTPUT ===
Produce a clean executive report in Markdown.
Required structure:
1. **Score Detail:** list the 12 indicators showing the computed real value and the points assigned. Show the penalty if it applies.
2. **Final Results:** final score (1 decimal) and risk level (Low/Medium/High).
3. **Structuring:** suggested line (with notes where applicable) and suggested limit (value in millions COP).
4. **Alerts:** list of detected alerts (negative equity, illiquidity, etc).
"#;

/// Names accepted by [`PromptTemplate::builtin`].
pub const BUILTIN_PROMPTS: &[&str] = &["credit_risk", "credit_risk_en"];

/// Instruction text placed before the documents in the generate payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PromptTemplate {
    name: String,
    text: String,
}

impl PromptTemplate {
    pub fn new(name: impl Into<String>, text: impl Into<String>) -> Result<Self> {
        let text = text.into();
        if text.trim().is_empty() {
            return Err(AnalysisError::Config("prompt text is empty".to_string()));
        }
        Ok(Self {
            name: name.into(),
            text,
        })
    }

    pub fn credit_risk() -> Self {
        Self {
            name: "credit_risk".to_string(),
            text: CREDIT_RISK_PROMPT.to_string(),
        }
    }

    pub fn credit_risk_en() -> Self {
        Self {
            name: "credit_risk_en".to_string(),
            text: CREDIT_RISK_PROMPT_EN.to_string(),
        }
    }

    pub fn builtin(name: &str) -> Option<Self> {
        match name {
            "credit_risk" => Some(Self::credit_risk()),
            "credit_risk_en" => Some(Self::credit_risk_en()),
            _ => None,
        }
    }

    /// Loads a template from a text/markdown file, named after the file stem.
    pub fn from_file(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path).map_err(|e| {
            AnalysisError::Config(format!("cannot read prompt {}: {}", path.display(), e))
        })?;
        let name = path
            .file_stem()
            .and_then(|s| s.to_str())
            .unwrap_or("custom")
            .to_string();
        Self::new(name, text)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn text(&self) -> &str {
        &self.text
    }
}

impl Default for PromptTemplate {
    fn default() -> Self {
        Self::credit_risk()
    }
}
