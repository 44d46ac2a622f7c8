// ==========================================
// 关税归类引擎 - 文件解析器实现
// ==========================================
// 支持: Excel (.xlsx/.xls) / CSV (.csv)
// 输入: 本地路径 或 上传缓冲区（file_name + bytes）
// ==========================================

use crate::domain::sync::SyncInput;
use crate::importer::error::{ImportError, ImportResult};
use crate::importer::importer_trait::{FileParser, RawRow};
use calamine::{Reader, Xls, Xlsx};
use csv::ReaderBuilder;
use std::collections::HashMap;
use std::fs::File;
use std::io::{Cursor, Read, Seek};

// ==========================================
// CSV Parser 实现
// ==========================================
pub struct CsvParser;

impl CsvParser {
    fn parse_reader<R: Read>(&self, source: R) -> ImportResult<Vec<RawRow>> {
        let mut reader = ReaderBuilder::new()
            .has_headers(true)
            .flexible(true) // 允许行长度不一致
            .from_reader(source);

        let headers: Vec<String> = reader
            .headers()?
            .iter()
            .map(clean_header)
            .collect();

        let mut records = Vec::new();
        for result in reader.records() {
            let record = result?;
            let mut row_map = HashMap::new();

            for (col_idx, value) in record.iter().enumerate() {
                if let Some(header) = headers.get(col_idx) {
                    row_map.insert(header.clone(), value.trim().to_string());
                }
            }

            // 跳过完全空白的行
            if row_map.values().all(|v| v.is_empty()) {
                continue;
            }

            records.push(row_map);
        }

        Ok(records)
    }
}

impl FileParser for CsvParser {
    fn parse_to_raw_records(&self, input: &SyncInput) -> ImportResult<Vec<RawRow>> {
        match input {
            SyncInput::Path(path) => {
                ensure_exists(input)?;
                self.parse_reader(File::open(path)?)
            }
            SyncInput::Upload { data, .. } => self.parse_reader(data.as_slice()),
        }
    }
}

// ==========================================
// Excel Parser 实现
// ==========================================
pub struct ExcelParser;

impl FileParser for ExcelParser {
    fn parse_to_raw_records(&self, input: &SyncInput) -> ImportResult<Vec<RawRow>> {
        ensure_exists(input)?;
        let ext = input.extension();

        match (input, ext.as_str()) {
            (SyncInput::Path(path), "xlsx") => {
                read_first_sheet(Xlsx::new(std::io::BufReader::new(File::open(path)?))?)
            }
            (SyncInput::Path(path), "xls") => {
                read_first_sheet(Xls::new(std::io::BufReader::new(File::open(path)?))?)
            }
            (SyncInput::Upload { data, .. }, "xlsx") => {
                read_first_sheet(Xlsx::new(Cursor::new(data.clone()))?)
            }
            (SyncInput::Upload { data, .. }, "xls") => {
                read_first_sheet(Xls::new(Cursor::new(data.clone()))?)
            }
            _ => Err(ImportError::UnsupportedFormat(ext)),
        }
    }
}

/// 读取第一个工作表（首行为表头）
fn read_first_sheet<RS, R>(mut workbook: R) -> ImportResult<Vec<RawRow>>
where
    RS: Read + Seek,
    R: Reader<RS>,
    R::Error: std::fmt::Display,
{
    let sheet_name = workbook
        .sheet_names()
        .first()
        .cloned()
        .ok_or_else(|| ImportError::ExcelParseError("Excel 文件无工作表".to_string()))?;

    let range = workbook
        .worksheet_range(&sheet_name)
        .map_err(|e| ImportError::ExcelParseError(e.to_string()))?;

    let mut rows = range.rows();
    let header_row = rows
        .next()
        .ok_or_else(|| ImportError::ExcelParseError("Excel 文件无数据行".to_string()))?;

    let headers: Vec<String> = header_row
        .iter()
        .map(|cell| clean_header(&cell.to_string()))
        .collect();

    let mut records = Vec::new();
    for data_row in rows {
        let mut row_map = HashMap::new();

        for (col_idx, cell) in data_row.iter().enumerate() {
            if let Some(header) = headers.get(col_idx) {
                row_map.insert(header.clone(), cell.to_string().trim().to_string());
            }
        }

        if row_map.values().all(|v| v.is_empty()) {
            continue;
        }

        records.push(row_map);
    }

    Ok(records)
}

fn clean_header(raw: &str) -> String {
    raw.trim_start_matches('\u{feff}').trim().to_string()
}

fn ensure_exists(input: &SyncInput) -> ImportResult<()> {
    if let SyncInput::Path(path) = input {
        if !path.exists() {
            return Err(ImportError::FileNotFound(path.display().to_string()));
        }
    }
    Ok(())
}

// ==========================================
// 通用文件解析器（根据扩展名自动选择）
// ==========================================
pub struct UniversalFileParser;

impl FileParser for UniversalFileParser {
    fn parse_to_raw_records(&self, input: &SyncInput) -> ImportResult<Vec<RawRow>> {
        match input.extension().as_str() {
            "csv" => CsvParser.parse_to_raw_records(input),
            "xlsx" | "xls" => ExcelParser.parse_to_raw_records(input),
            other => Err(ImportError::UnsupportedFormat(other.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::Builder;

    #[test]
    fn test_csv_parser_from_path() {
        let mut temp_file = Builder::new().suffix(".csv").tempfile().unwrap();
        writeln!(temp_file, "\u{feff}Goods code,Indent,Description").unwrap();
        writeln!(temp_file, "0101000000 80,0,Live horses").unwrap();
        writeln!(temp_file, ",,").unwrap();
        writeln!(temp_file, "0101210000 80,2,Pure-bred").unwrap();
        temp_file.flush().unwrap();

        let input = SyncInput::Path(temp_file.path().to_path_buf());
        let rows = UniversalFileParser.parse_to_raw_records(&input).unwrap();

        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].get("Goods code").map(String::as_str), Some("0101000000 80"));
        assert_eq!(rows[1].get("Description").map(String::as_str), Some("Pure-bred"));
    }

    #[test]
    fn test_csv_parser_from_upload() {
        let input = SyncInput::Upload {
            file_name: "duties.CSV".to_string(),
            data: b"Commodity code,Origin\n0101210000,CN\n".to_vec(),
        };
        let rows = UniversalFileParser.parse_to_raw_records(&input).unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].get("Origin").map(String::as_str), Some("CN"));
    }

    #[test]
    fn test_missing_file_and_unsupported_format() {
        let missing = SyncInput::Path("/definitely/not/here.csv".into());
        assert!(matches!(
            UniversalFileParser.parse_to_raw_records(&missing),
            Err(ImportError::FileNotFound(_))
        ));

        let pdf = SyncInput::Upload {
            file_name: "rates.pdf".to_string(),
            data: Vec::new(),
        };
        assert!(matches!(
            UniversalFileParser.parse_to_raw_records(&pdf),
            Err(ImportError::UnsupportedFormat(ext)) if ext == "pdf"
        ));
    }

    #[test]
    fn test_corrupt_xlsx_upload_is_parse_error() {
        let input = SyncInput::Upload {
            file_name: "nomenclature.xlsx".to_string(),
            data: b"not a zip".to_vec(),
        };
        assert!(matches!(
            UniversalFileParser.parse_to_raw_records(&input),
            Err(ImportError::ExcelParseError(_))
        ));
    }
}
