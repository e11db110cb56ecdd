//! Prompt texts and renderers for every pipeline.
//!
//! The clinical prompts are Hebrew because the physician notes they operate
//! on are Hebrew. The extraction prompt is English so the JSON keys and enum
//! values stay stable.

use std::fmt::Write as _;

use crate::cases::CaseRecord;

pub const TREATMENT_PLAN_SYSTEM: &str = "כרופא אונקולוג, אני זקוק לסיוע בגיבוש תוכנית טיפול מקיפה עבור מטופלים שאובחנו לאחרונה עם סרטן. \
אתה הולך לקבל מידע על המטופל. אנא ספק מתווה מפורט של אפשרויות טיפול פוטנציאליות, \
כולל משטרי כימותרפיה, גישות כירורגיות, שיקולי טיפול בקרינה, וטיפולים ממוקדים על בסיס \
הידע הקיים שלך על הנחיות NCCN & ESMO העדכניות ביותר. \
בנוסף הצע בדיקות דם מתאימות לאבחנה (תפרט בבקשה את הבדיקות באופן ספציפי), בנוסף, הצע אסטרטגיות לניהול תופעות לוואי נפוצות ותאר נקודות מפתח \
לחינוך המטופלת בנוגע לפרוגנוזה ושינויים באורח החיים. ענה בעברית בלבד. \
לכל המלצה הסבר את הסיבה להמלצה.";

/// Label of the score line the comparison prompt asks for.
pub const SCORE_LABEL: &str = "ציון דמיון מספרי (0-1):";

pub const COMPARISON_SYSTEM: &str = "אתה עוזר AI שתפקידך הוא להשוות בין המלצת טיפול שנוצרה על ידי מודל שפה גדול (LLM) לבין סיכום, מסקנות והמלצות שניתנו על ידי רופא אנושי. \
אנא ספק ניתוח השוואתי מפורט. התמקד בנקודות הבאות:
1.  **דמיון**: מהן נקודות הדמיון העיקריות בין המלצת ה-LLM לבין המלצות הרופא?
2.  **הבדלים**: מהם ההבדלים המרכזיים? האם ה-LLM הציע משהו שהרופא לא, או להיפך?
3.  **שלמות**: האם המלצת ה-LLM מקיפה כמו זו של הרופא? האם חסרים בה אלמנטים קריטיים?
4.  **דיוק קליני**: בהתחשב במידע המוגבל, האם המלצת ה-LLM נראית סבירה מבחינה קלינית בהשוואה לרופא? (ציין שזו הערכה ראשונית).
5.  **הערות נוספות**: כל תובנה או הערה רלוונטית אחרת שעולה מההשוואה.
6.  **ציון דמיון מספרי**: בסוף הניתוח שלך, אנא הוסף שורה נפרדת עם ציון הדמיון המספרי בין המלצת ה-LLM להמלצת הרופא. הציון צריך להיות בין 0 (לא דומה כלל) ל-1 (דומה מאוד). השתמש בפורמט הבא בדיוק: `ציון דמיון מספרי (0-1): [הציון שלך]` (לדוגמה: `ציון דמיון מספרי (0-1): 0.85`).
ענה בעברית בלבד, בצורה ברורה ומובנית.";

pub const CROSS_CASE_SYSTEM: &str = "כרופא אונקולוג מומחה, אתה מתבקש לבצע ניתוח-על (cross-analysis) של המלצות טיפול ותיאורי מחלה שניתנו במקרים אונקולוגיים שונים. \
לכל מקרה, תקבל את תיאור המחלה, סיכום ומסקנות הרופא, והמלצות הטיפול של הרופא. \
המטרה היא לזהות מאפיינים משותפים, דפוסים, או קשרים בין סוגי ההמלצות הטיפוליות לבין מאפייני המקרים (כגון סוג המחלה, שלב משוער, או מאפיינים קליניים אחרים שניתן להסיק מהמידע שנמסר, כולל מסיכום הרופא). \
התמקד בסוגי ההמלצות הבאים: כימותרפיה, אימונותרפיה, טיפול בקרינה, כירורגיה, טיפול ביולוגי, טיפול תומך/פליאטיבי, ושילובים שלהם. \
בסס את הניתוח שלך על הידע הקיים שלך בהנחיות NCCN ו-ESMO העדכניות ביותר. \
אנא הצג את הממצאים שלך בצורה מובנית וברורה, רצוי לקבץ אותם לפי סוג ההמלצה העיקרי, לפי סוג המחלה, או לפי מאפיינים משותפים משמעותיים שזיהית. התייחס גם לסיכום ומסקנות הרופא כחלק מהקונטקסט לניתוח ההמלצות. \
לדוגמה, אם מספר מקרים עם המלצה לכימותרפיה חולקים מאפיין מסוים (למשל, שלב מחלה מתקדם המשתמע מההמלצה או תיאור המחלה), ציין זאת. \
הניתוח צריך להיות מעמיק ומבוסס על הנתונים שסופקו. \
ענה בעברית בלבד.";

const CROSS_CASE_INTRO: &str = "להלן מספר מקרים אונקולוגיים, כל אחד עם תיאור המחלה והמלצות הרופא.
אנא נתח מקרים אלו כדי למצוא מאפיינים משותפים בין המטופלים או המחלות, בהתבסס על סוגי ההמלצות שניתנו, תיאורי המחלה, וסיכום/מסקנות הרופא.
התמקד במציאת דפוסים הקושרים סוגי המלצות (כגון כימותרפיה, כירורגיה, טיפול קרינתי, אימונותרפיה, טיפול ביולוגי, טיפול תומך/פליאטיבי) למאפייני מקרה.
ארגן את התשובה שלך בצורה ברורה ומפורטת, קבץ את הממצאים לפי סוג ההמלצה, סוג המחלה, או מאפיינים משותפים אחרים שאתה מזהה.

מקרים לניתוח:
";

const CROSS_CASE_CLOSING: &str =
    "\n\nאנא ספק את הניתוח המבוקש, תוך התייחסות להנחיות שקיבלת בפרומפט המערכת.";

/// Closed vocabulary the reasoning prompt draws reasons from.
pub const REASON_VOCABULARY: &[&str] = &[
    "PS Good 0-1",
    "PS Intermediate 2",
    "Age young",
    "Age old",
    "PDL-1 high",
    "PDL-1 low",
    "PDL-1 unknown",
    "High disease burden",
    "low disease burden",
    "Comorbidities renal",
    "Comorbidities cardiac",
    "Comorbidities hepatic",
    "Comorbidities pulmonary\\copd",
    "Comorbidities autoimmune",
    "Comorbidities viral(HBV\\HIV)",
    "Comorbidities other",
    "Curative",
    "Palliative",
    "QoL priority",
    "Refusal of chemo",
    "Awaiting NGS",
    "Dx not final",
    "Material insufficient",
];

#[must_use]
pub fn reasoning_system() -> String {
    format!(
        "אתה רופא אונקולוג עלייך לבסס את התשובות שלך על בסיס NCCN וESMO, \
אתה צריך לציין את הסיבות וההגיון שהובילו את הרופא להחלטה על טיפול. \
כל מטופל מקבל טיפול אחד משני סוגים או רק אימונו או אימונו וכימו, עלייך להבין איזה סוג טיפול המטופל קיבל \
ולדרג את השיקולים שלו לפי הסדר, לסדר את זה בצורה מדורגת לפי עוצמה שהשפיעה על החלטת הטיפול בין \
אם זה אימונולוגי לבד או אימונולוגי וכימו. \
ענה בעברית בלבד ורשום בדיוק 4 סיבות. \
הסיבה צריכה להיבחר מהרשימה הבאה: {}. \
הכי חשובות בפורמט הבא:\n\
1. [סוג טיפול]\n\
2. [סיבה ראשונה]\n\
3. [סיבה שנייה]\n\
4. [סיבה שלישית]\n\
5. [סיבה רביעית]",
        REASON_VOCABULARY.join(", ")
    )
}

pub const EXTRACTION_SYSTEM: &str = "You are an AI assistant specialized in extracting structured information from oncological medical case notes.
Given a patient's case information (Current Disease, Summary & Conclusions, Recommendations), extract the following details:
1.  **Cancer Type**: (String, e.g., \"Lung Cancer\", \"Breast Cancer\", \"Prostate Cancer\". If not determinable, use \"Unknown\")
2.  **Metastasized**: (Boolean: True if cancer has metastasized or is described as advanced/spread, False otherwise or if localized. If not determinable, use null.)
3.  **Age**: (Integer: Patient's age in years. If not determinable, use null.)
4.  **Background Illnesses**: (List of strings: e.g., [\"Diabetes Type 2\", \"Hypertension\"]. If none mentioned or not determinable, use an empty list.)
5.  **Treatment Type**: (String: Must be one of \"Immunotherapy and Chemotherapy\" or \"Immunotherapy Only\". If the text suggests a different primary oncological treatment (e.g. chemo only, surgery only, radiation only) or if it's unclear, state \"Other/Unclear\".)
6.  **Reason for Treatment Choice**: (String: Briefly explain the rationale for the chosen treatment type based on the provided text. If not determinable, use \"Not Specified\".)
7.  **PDL1 Score**: (Float between 0.0 and 1.0. If a percentage is mentioned (e.g., \"PD-L1 50%\", \"PDL1 >50%\", \"PDL1 <1%\"), convert it to a decimal (e.g., 0.5 for 50%, 0.5 for >50% if no more specific value, 0.01 for <1% if no more specific value). If a general term like \"high\" or \"low\" is used without a number, or if testing is recommended but no result given, use null. If not mentioned at all, use null.)
8.  **Dosage Change**: (Float: Applicable only if 'Treatment Type' is \"Immunotherapy and Chemotherapy\". If a dosage change for chemotherapy is mentioned, provide the percentage of change as a float (e.g., -20.0 for a 20% reduction, 10.0 for a 10% increase). If no change is mentioned or it's explicitly stated as no change, use 0.0. If a change is mentioned but not quantifiable (e.g., \"dose adjustment\"), use -1.0. If not applicable, use null.)
9.  **Chemotherapy Medication Type**: (String: Applicable only if 'Treatment Type' is \"Immunotherapy and Chemotherapy\". List the chemotherapy medication(s) mentioned, e.g., \"Carboplatin, Pemetrexed\". If multiple, join with a comma. If not applicable or not mentioned, use \"N/A\".)
10. **Performance Status**: (Integer: ECOG Performance Status (PS) score from 0-4. If mentioned as \"PS 2\", \"ECOG 1\", \"performance status 3\", etc., extract the numeric value. If described as \"good performance status\" without a number, use null. If not mentioned, use null.)

Your entire response MUST be a single, valid JSON object. Do not include any explanatory text, markdown, or any characters outside of this JSON object.
The JSON object must have the following keys: \"cancer_type\", \"metastasized\", \"age\", \"background_illnesses\", \"treatment_type\", \"reason_for_treatment_choice\", \"pdl1_score\", \"dosage_change\", \"chemotherapy_medication_type\", \"performance_status\".
Ensure all string fields are populated, using \"Not Specified\", \"N/A\", or \"Unknown\" where appropriate if information cannot be extracted. For lists, use an empty list if no information. For numbers/booleans, use null if not determinable.";

pub const PER_DOCTOR_SYSTEM: &str = "כאונקולוג מומחה, משימתך היא לנתח את החלטות הטיפול של רופא ספציפי על סמך מקרי מטופלים שיוצגו בפניך. המטרה המרכזית היא לחשוף דפוסים, הטיות ורמזים נסתרים בתהליך קבלת ההחלטות של הרופא. \
עליך לבחון לעומק כיצד משתנים כמו גיל המטופל, מינו, עיר מגוריו, ומצבו הסוציו-אקונומי (כפי שניתן להסיק מהנתונים) עשויים להשפיע על המלצות הטיפול. \
בנוסף, נתח את הקשר בין מחלות רקע, שלב המחלה, וסוג הטיפול הנבחר או המינון שלו. \
לדוגמה, האם הרופא נוטה להמליץ על טיפול אגרסיבי יותר למטופלים צעירים? האם ישנה העדפה לטיפולים מסוימים בערים מסוימות? האם מחלות רקע ספציפיות משפיעות באופן עקבי על החלטות הטיפול? \
הצג את ממצאיך בצורה מפורטת, מנומקת ומגובה בנתונים מהמקרים שסופקו. בסס את הניתוח שלך על הידע העדכני ביותר ועל קווי המנחה של NCCN ו-ESMO. \
הניתוח שלך צריך להיות מבוסס על הנתונים שסופקו בלבד. אנא כתוב את תשובתך בעברית.";

/// Base of the guideline-grounded plan prompt; the chosen guideline text
/// follows it.
pub const GUIDED_PLAN_SYSTEM: &str = "כרופא אונקולוג, אני זקוק לסיוע בגיבוש תוכנית טיפול מקיפה עבור מטופלים שאובחנו לאחרונה עם סרטן. \
אתה הולך לקבל מידע על המטופל. אנא ספק מתווה מפורט של אפשרויות טיפול פוטנציאליות, \
כולל משטרי כימותרפיה, גישות כירורגיות, שיקולי טיפול בקרינה, וטיפולים ממוקדים על בסיס \
הנחיות אונקולוגיות עדכניות. בנוסף הצע בדיקות דם מתאימות לאבחנה (תפרט בבקשה את הבדיקות באופן ספציפי), בנוסף, הצע אסטרטגיות לניהול תופעות לוואי נפוצות ותאר נקודות מפתח \
לחינוך המטופלת בנוגע לפרוגנוזה ושינויים באורח החיים. ענה בעברית בלבד. \
לכל המלצה הסבר את הסיבה להמלצה. \
להלן NCCN Guidelines ו-ESMO Guidelines לפיהן עליך לענות:";

const GUIDELINE_SELECTION_INTRO: &str = "You are an expert oncologist. Based on the patient description I will provide, \
determine which NCCN guideline file would be most appropriate to use. \
Here are previews of all available guideline files. Each file is separated by \
======= borders and clearly labeled with 'GUIDELINE FILE: filename.txt':\n\n";

const GUIDELINE_SELECTION_CLOSING: &str = "\nBased on the following patient description, respond ONLY with the exact filename \
(including .txt extension) that best matches the patient's condition. \
Provide no other text in your response.";

const GUIDELINE_DESCRIPTION_INTRO: &str = "Provide a 50-word description of the disease discussed in this medical guideline, \
focusing only on medical concepts. Try to fill as much of the 50 words as possible \
with medical terms. Only output the description, nothing else.\n\n\
Here is the document:\n\n";

/// System prompt listing every guideline preview between `=` borders.
#[must_use]
pub fn guideline_selection_system(previews: &[(String, String)]) -> String {
    let border = "=".repeat(80);
    let mut prompt = GUIDELINE_SELECTION_INTRO.to_owned();
    for (name, preview) in previews {
        let _ = write!(
            prompt,
            "\n{border}\nGUIDELINE FILE: {name}\n{border}\n{preview}\n{border}\n"
        );
    }
    prompt.push_str(GUIDELINE_SELECTION_CLOSING);
    prompt
}

#[must_use]
pub fn guided_plan_system(guideline: &str) -> String {
    format!("{GUIDED_PLAN_SYSTEM}\n\n{guideline}\n\n")
}

#[must_use]
pub fn guideline_description_user(preview: &str) -> String {
    format!("{GUIDELINE_DESCRIPTION_INTRO}{preview}")
}

/// Second single-case call: the generated plan against the physician's notes.
#[must_use]
pub fn comparison_user(plan: &str, summary: &str, recommendations: &str) -> String {
    format!(
        "הנך מתבקש להשוות את שני הטקסטים הבאים:\n\n\
טקסט 1: המלצת טיפול שנוצרה על ידי LLM:\n---\n{plan}\n---\n\n\
טקסט 2: סיכום, מסקנות והמלצות של רופא אנושי:\n---\n\
סיכום ומסקנות הרופא:\n{summary}\n\n\
המלצות הרופא:\n{recommendations}\n---\n\n\
אנא ספק את ניתוח ההשוואה שלך בהתאם להנחיות שקיבלת."
    )
}

/// One user prompt embedding every case as a numbered, delimited block.
#[must_use]
pub fn cross_case_user(cases: &[CaseRecord]) -> String {
    let blocks: Vec<String> = cases
        .iter()
        .enumerate()
        .map(|(i, case)| {
            let n = i + 1;
            format!(
                "\n--- מקרה {n} ---\nתיאור המחלה:\n{}\n\nסיכום ומסקנות הרופא:\n{}\n\nהמלצות הרופא:\n{}\n--- סוף מקרה {n} ---\n",
                case.disease, case.summary, case.recommendations
            )
        })
        .collect();
    format!("{CROSS_CASE_INTRO}{}{CROSS_CASE_CLOSING}", blocks.join("\n"))
}

#[must_use]
pub fn reasoning_user(case: &CaseRecord) -> String {
    format!(
        "כך סיכם הרופא את המקרה:\n{}\n\nזה מה שהחליט הרופא:\n{} {}",
        case.disease, case.recommendations, case.summary
    )
}

#[must_use]
pub fn extraction_user(case: &CaseRecord) -> String {
    format!(
        "Case Information:\n\n\
Current Disease:\n{}\n\n\
Summary & Conclusions (Doctor):\n{}\n\n\
Recommendations (Doctor):\n{}\n\n\
---\n\
Please extract the patient details based on the above information and provide a JSON output.",
        case.disease, case.summary, case.recommendations
    )
}

/// Per-physician prompt. Each case is rendered as its non-empty
/// `column: value` pairs.
#[must_use]
pub fn per_doctor_user(doctor: &str, headers: &[String], rows: &[Vec<String>]) -> String {
    let mut prompt = format!(
        "להלן מספר מקרים אונקולוגיים שטופלו על ידי ד\"ר {doctor}.\n\
אנא נתח את המקרים הללו כדי למצוא מאפיינים משותפים, דפוסים או הטיות בקבלת ההחלטות של הרופא, בהתבסס על הנחיותיך.\n\n\
מקרים לניתוח:\n"
    );
    for (i, row) in rows.iter().enumerate() {
        let n = i + 1;
        let details: Vec<String> = headers
            .iter()
            .zip(row)
            .filter(|(_, v)| !v.trim().is_empty())
            .map(|(k, v)| format!("{k}: {v}"))
            .collect();
        let _ = write!(
            prompt,
            "\n--- מקרה מספר {n} ---\n{}\n--- סוף מקרה מספר {n} ---\n",
            details.join(", ")
        );
    }
    prompt.push_str("\n\nאנא ספק את הניתוח המבוקש, בהתאם להנחיות שקיבלת.");
    prompt
}
